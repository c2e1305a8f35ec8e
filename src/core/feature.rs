//! Feature declarations and the validated feature graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigureError;
use crate::core::platform::{OsFamily, TargetPlatform};
use crate::util::graph::DependencyGraph;

/// Toolchain flag sets a feature switches on when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolchainHook {
    Threads,
    Pic,
}

/// A named, independently toggleable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "default", default)]
    pub default_enabled: bool,

    #[serde(default)]
    pub requires: BTreeSet<String>,

    #[serde(default)]
    pub excludes: BTreeSet<String>,

    /// OS families the feature exists on. Empty means all.
    #[serde(default)]
    pub os: BTreeSet<OsFamily>,

    /// Architectures the feature exists on. Empty means all.
    #[serde(default)]
    pub archs: BTreeSet<String>,

    /// Defines added while the feature is enabled.
    #[serde(default)]
    pub defines: Vec<String>,

    #[serde(default)]
    pub toolchain: Option<ToolchainHook>,
}

impl FeatureFlag {
    pub fn new(name: impl Into<String>) -> Self {
        FeatureFlag {
            name: name.into(),
            description: String::new(),
            default_enabled: false,
            requires: BTreeSet::new(),
            excludes: BTreeSet::new(),
            os: BTreeSet::new(),
            archs: BTreeSet::new(),
            defines: Vec::new(),
            toolchain: None,
        }
    }

    pub fn enabled_by_default(mut self) -> Self {
        self.default_enabled = true;
        self
    }

    pub fn requires(mut self, names: &[&str]) -> Self {
        self.requires.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn excludes(mut self, names: &[&str]) -> Self {
        self.excludes.extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn only_on_archs(mut self, archs: &[&str]) -> Self {
        self.archs.extend(archs.iter().map(|s| s.to_string()));
        self
    }

    /// Whether the feature exists on `platform` at all.
    pub fn available_on(&self, platform: &TargetPlatform) -> bool {
        (self.os.is_empty() || self.os.contains(&platform.os_family))
            && (self.archs.is_empty() || self.archs.contains(&platform.arch))
    }

    /// The define emitted while the feature is disabled, e.g. `OPENSSL_NO_SSL3_METHOD`.
    pub fn disabled_define(&self, prefix: &str) -> String {
        format!(
            "{}_NO_{}",
            prefix,
            self.name.to_ascii_uppercase().replace('-', "_")
        )
    }
}

static FEATURE_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").ok());

/// Whether `name` is a well-formed feature name.
pub fn is_valid_feature_name(name: &str) -> bool {
    FEATURE_NAME.as_ref().is_some_and(|re| re.is_match(name))
}

/// Every known feature with its requirement and exclusion edges.
///
/// Construction validates the graph; a `FeatureGraph` that exists is
/// internally consistent.
#[derive(Debug, Clone)]
pub struct FeatureGraph {
    features: BTreeMap<String, FeatureFlag>,
    requires: DependencyGraph<String>,
}

impl FeatureGraph {
    /// Validate and build the graph.
    pub fn new(flags: Vec<FeatureFlag>) -> Result<Self, ConfigureError> {
        let mut features = BTreeMap::new();
        for flag in flags {
            if !is_valid_feature_name(&flag.name) {
                return Err(ConfigureError::invalid_catalog(format!(
                    "feature name `{}` must match [a-z0-9][a-z0-9_-]*",
                    flag.name
                )));
            }
            let name = flag.name.clone();
            if features.insert(name.clone(), flag).is_some() {
                return Err(ConfigureError::invalid_catalog(format!(
                    "feature `{}` is declared twice",
                    name
                )));
            }
        }

        let mut requires = DependencyGraph::new();
        for (name, flag) in &features {
            requires.add_node(name.clone());
            check_edges(&features, flag)?;
            for dep in &flag.requires {
                requires.add_dependency(name.clone(), dep.clone());
            }
        }

        if let Some(cycle) = requires.cycles().into_iter().next() {
            return Err(ConfigureError::CyclicFeatureDependency { cycle });
        }

        let graph = FeatureGraph { features, requires };
        graph.check_defaults()?;
        graph.check_availability()?;
        Ok(graph)
    }

    /// Default-enabled features must have their requirements enabled by
    /// default and their exclusions disabled by default.
    fn check_defaults(&self) -> Result<(), ConfigureError> {
        for flag in self.features.values().filter(|f| f.default_enabled) {
            for dep in &flag.requires {
                if !self.features[dep].default_enabled {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "`{}` is enabled by default but requires `{}`, which is not",
                        flag.name, dep
                    )));
                }
            }
            for other in &flag.excludes {
                if self.features[other].default_enabled {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "`{}` and `{}` are both enabled by default but exclude each other",
                        flag.name, other
                    )));
                }
            }
        }
        Ok(())
    }

    /// A feature may only exist where everything it requires also exists.
    fn check_availability(&self) -> Result<(), ConfigureError> {
        for flag in self.features.values() {
            for dep_name in &flag.requires {
                let dep = &self.features[dep_name];
                let os_covered = dep.os.is_empty()
                    || (!flag.os.is_empty() && flag.os.is_subset(&dep.os));
                let archs_covered = dep.archs.is_empty()
                    || (!flag.archs.is_empty() && flag.archs.is_subset(&dep.archs));
                if !os_covered || !archs_covered {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "`{}` can be available where its requirement `{}` is not",
                        flag.name, dep_name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FeatureFlag> {
        self.features.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.features.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Features in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureFlag> {
        self.features.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.keys().map(String::as_str)
    }

    /// Features that directly require `name`.
    pub fn required_by(&self, name: &str) -> Vec<String> {
        self.requires.dependents(&name.to_string())
    }

    /// Enabled features when nothing is overridden on `platform`.
    pub fn defaults_for(&self, platform: &TargetPlatform) -> BTreeSet<String> {
        self.features
            .values()
            .filter(|f| f.default_enabled && f.available_on(platform))
            .map(|f| f.name.clone())
            .collect()
    }

    /// Known names close to `name`, for "did you mean" hints.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(usize, &str)> = self
            .features
            .keys()
            .filter_map(|candidate| {
                let distance = edit_distance(name, candidate);
                let close = distance <= 2
                    || (name.len() >= 3
                        && (candidate.starts_with(name) || name.starts_with(candidate.as_str())));
                close.then_some((distance, candidate.as_str()))
            })
            .collect();
        scored.sort();
        scored.into_iter().take(3).map(|(_, s)| s.to_string()).collect()
    }
}

fn check_edges(
    features: &BTreeMap<String, FeatureFlag>,
    flag: &FeatureFlag,
) -> Result<(), ConfigureError> {
    for (kind, edges) in [("requires", &flag.requires), ("excludes", &flag.excludes)] {
        for target in edges {
            if target == &flag.name {
                return Err(ConfigureError::invalid_catalog(format!(
                    "`{}` {} itself",
                    flag.name, kind
                )));
            }
            if !features.contains_key(target) {
                return Err(ConfigureError::invalid_catalog(format!(
                    "`{}` {} unknown feature `{}`",
                    flag.name, kind, target
                )));
            }
        }
    }
    if let Some(both) = flag.requires.intersection(&flag.excludes).next() {
        return Err(ConfigureError::invalid_catalog(format!(
            "`{}` both requires and excludes `{}`",
            flag.name, both
        )));
    }
    Ok(())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
