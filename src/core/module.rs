//! Libraries and provider modules, and which of them a configuration builds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigureError;
use crate::core::feature::FeatureGraph;
use crate::core::state::Configuration;
use crate::util::graph::DependencyGraph;
use crate::util::log::{DecisionLog, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Library,
    Provider,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Library => write!(f, "library"),
            ModuleKind::Provider => write!(f, "provider"),
        }
    }
}

/// Where a built module is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallDir {
    #[default]
    Lib,
    Modules,
    None,
}

/// A path that is only used while `feature` is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GatedPathRepr")]
pub struct GatedPath {
    pub path: String,
    pub feature: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GatedPathRepr {
    Plain(String),
    Gated {
        path: String,
        #[serde(default)]
        feature: Option<String>,
    },
}

impl From<GatedPathRepr> for GatedPath {
    fn from(repr: GatedPathRepr) -> Self {
        match repr {
            GatedPathRepr::Plain(path) => GatedPath {
                path,
                feature: None,
            },
            GatedPathRepr::Gated { path, feature } => GatedPath { path, feature },
        }
    }
}

impl GatedPath {
    fn applies(&self, config: &Configuration) -> bool {
        self.feature
            .as_deref()
            .map_or(true, |feature| config.is_enabled(feature))
    }
}

/// A unit of the package built from sources: a library or a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderModule {
    pub name: String,
    pub kind: ModuleKind,

    /// Directory the archive is placed in, relative to the build root.
    #[serde(default)]
    pub dir: String,

    #[serde(default)]
    pub required_features: BTreeSet<String>,

    #[serde(default)]
    pub required_generated: Vec<GatedPath>,

    #[serde(default)]
    pub sources: Vec<GatedPath>,

    #[serde(default)]
    pub requires_modules: BTreeSet<String>,

    #[serde(default)]
    pub install: InstallDir,
}

/// A module with its feature-gated paths evaluated for one configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedModule {
    pub name: String,
    pub kind: ModuleKind,
    pub dir: String,
    pub required_headers: BTreeSet<String>,
    pub sources: BTreeSet<String>,
    pub requires_modules: BTreeSet<String>,
    pub install: InstallDir,
}

impl ProviderModule {
    /// Whether every required feature is enabled.
    pub fn is_enabled_for(&self, config: &Configuration) -> bool {
        self.required_features.iter().all(|f| config.is_enabled(f))
    }

    pub fn resolve(&self, config: &Configuration) -> ResolvedModule {
        let pick = |paths: &[GatedPath]| -> BTreeSet<String> {
            paths
                .iter()
                .filter(|p| p.applies(config))
                .map(|p| p.path.clone())
                .collect()
        };
        ResolvedModule {
            name: self.name.clone(),
            kind: self.kind,
            dir: self.dir.clone(),
            required_headers: pick(&self.required_generated),
            sources: pick(&self.sources),
            requires_modules: self.requires_modules.clone(),
            install: self.install,
        }
    }
}

/// Every module in declaration order.
#[derive(Debug, Clone)]
pub struct ProviderModuleCatalog {
    modules: Vec<ProviderModule>,
}

impl ProviderModuleCatalog {
    /// Validate module declarations against the feature graph.
    pub fn new(modules: Vec<ProviderModule>, features: &FeatureGraph) -> Result<Self, ConfigureError> {
        let mut names = BTreeSet::new();
        for module in &modules {
            if !names.insert(module.name.as_str()) {
                return Err(ConfigureError::invalid_catalog(format!(
                    "module `{}` is declared twice",
                    module.name
                )));
            }
        }

        let mut graph = DependencyGraph::new();
        for module in &modules {
            graph.add_node(module.name.clone());

            let gated = module
                .required_generated
                .iter()
                .chain(module.sources.iter())
                .filter_map(|p| p.feature.as_ref());
            for feature in module.required_features.iter().chain(gated) {
                if !features.contains(feature) {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "module `{}` refers to unknown feature `{}`",
                        module.name, feature
                    )));
                }
            }

            for dep in &module.requires_modules {
                if !names.contains(dep.as_str()) {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "module `{}` requires unknown module `{}`",
                        module.name, dep
                    )));
                }
                graph.add_dependency(module.name.clone(), dep.clone());
            }
        }

        if let Some(cycle) = graph.cycles().into_iter().next() {
            return Err(ConfigureError::invalid_catalog(format!(
                "module dependency cycle: {} -> {}",
                cycle.join(" -> "),
                cycle.first().map(String::as_str).unwrap_or_default()
            )));
        }

        Ok(ProviderModuleCatalog { modules })
    }

    pub fn get(&self, name: &str) -> Option<&ProviderModule> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderModule> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules whose required features are all enabled, in declaration order.
    pub fn modules_enabled_for(
        &self,
        config: &Configuration,
        log: &mut DecisionLog,
    ) -> Vec<ResolvedModule> {
        let mut enabled = Vec::new();
        for module in &self.modules {
            if module.is_enabled_for(config) {
                enabled.push(module.resolve(config));
            } else {
                let missing: Vec<&str> = module
                    .required_features
                    .iter()
                    .filter(|f| !config.is_enabled(f))
                    .map(String::as_str)
                    .collect();
                log.note(
                    Stage::Modules,
                    format!(
                        "skip {} `{}` (needs {})",
                        module.kind,
                        module.name,
                        missing.join(", ")
                    ),
                );
            }
        }
        enabled
    }

    /// Order `enabled` so every module follows the modules it requires.
    ///
    /// Fails when a module requires one that is not in `enabled`.
    pub fn build_order(
        &self,
        enabled: &[ResolvedModule],
        log: &mut DecisionLog,
    ) -> Result<Vec<ResolvedModule>, ConfigureError> {
        let by_name: BTreeMap<&str, &ResolvedModule> =
            enabled.iter().map(|m| (m.name.as_str(), m)).collect();

        let mut graph = DependencyGraph::new();
        for module in enabled {
            graph.add_node(module.name.clone());
            for dep in &module.requires_modules {
                if !by_name.contains_key(dep.as_str()) {
                    log.error(
                        Stage::Modules,
                        format!("`{}` requires module `{}`, which is disabled", module.name, dep),
                    );
                    return Err(ConfigureError::MissingModuleDependency {
                        module: module.name.clone(),
                        missing: dep.clone(),
                    });
                }
                graph.add_dependency(module.name.clone(), dep.clone());
            }
        }

        // Libraries before providers when both are ready.
        let order = graph
            .topological_order_by(|name| {
                let kind = by_name.get(name.as_str()).map(|m| m.kind);
                (kind, name.clone())
            })
            .map_err(|cycles| {
                ConfigureError::invalid_catalog(format!(
                    "module dependency cycle: {}",
                    cycles.first().map(|c| c.join(" -> ")).unwrap_or_default()
                ))
            })?;

        let ordered: Vec<ResolvedModule> = order
            .iter()
            .filter_map(|name| by_name.get(name.as_str()).map(|m| (*m).clone()))
            .collect();
        log.note(
            Stage::Modules,
            format!(
                "build order: {}",
                ordered
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
        Ok(ordered)
    }
}
