//! Generated-artifact planning.
//!
//! Collects every generated file the enabled modules need, closes over
//! `depends_on`, and orders the result so nothing is generated before the
//! files it is derived from. All metadata artifacts come before any header
//! artifact.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::core::artifact::{ArtifactStage, GeneratedArtifact};
use crate::core::errors::ConfigureError;
use crate::core::module::ResolvedModule;
use crate::util::graph::DependencyGraph;
use crate::util::log::{DecisionLog, Stage};

/// Generated artifacts in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactPlan {
    artifacts: Vec<GeneratedArtifact>,
}

impl ArtifactPlan {
    pub fn artifacts(&self) -> &[GeneratedArtifact] {
        &self.artifacts
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneratedArtifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.artifacts.iter().map(|a| a.path.as_str()).collect()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.position(path).is_some()
    }

    pub fn position(&self, path: &str) -> Option<usize> {
        self.artifacts.iter().position(|a| a.path == path)
    }

    /// Config-dump artifacts, in plan order.
    pub fn config_dumps(&self) -> impl Iterator<Item = &GeneratedArtifact> {
        self.artifacts.iter().filter(|a| a.is_config_dump())
    }

    /// Check that the order is usable: no duplicates, every dependency is
    /// planned earlier, and no header precedes a metadata artifact.
    pub fn verify(&self) -> Result<(), ConfigureError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut header_seen: Option<&str> = None;

        for artifact in &self.artifacts {
            for dep in &artifact.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(ConfigureError::InconsistentPlan {
                        message: format!(
                            "`{}` is planned before its dependency `{}`",
                            artifact.path, dep
                        ),
                    });
                }
            }
            match artifact.stage() {
                ArtifactStage::Header => header_seen = header_seen.or(Some(artifact.path.as_str())),
                ArtifactStage::Metadata => {
                    if let Some(header) = header_seen {
                        return Err(ConfigureError::InconsistentPlan {
                            message: format!(
                                "metadata `{}` is planned after header `{}`",
                                artifact.path, header
                            ),
                        });
                    }
                }
            }
            if !seen.insert(artifact.path.as_str()) {
                return Err(ConfigureError::InconsistentPlan {
                    message: format!("`{}` is planned twice", artifact.path),
                });
            }
        }
        Ok(())
    }
}

/// Orders the generated artifacts one configuration needs.
#[derive(Debug, Clone, Copy)]
pub struct GeneratedArtifactPlanner<'a> {
    artifacts: &'a BTreeMap<String, GeneratedArtifact>,
}

impl<'a> GeneratedArtifactPlanner<'a> {
    pub fn new(artifacts: &'a BTreeMap<String, GeneratedArtifact>) -> Self {
        GeneratedArtifactPlanner { artifacts }
    }

    /// Plan generation for `modules`.
    ///
    /// Every config-dump artifact is always planned. Headers are planned
    /// when some enabled module needs them, directly or through
    /// `depends_on`.
    pub fn plan(
        &self,
        modules: &[ResolvedModule],
        log: &mut DecisionLog,
    ) -> Result<ArtifactPlan, ConfigureError> {
        let needed = self.closure(modules, log)?;

        let mut graph = DependencyGraph::new();
        for artifact in needed.values() {
            graph.add_node(artifact.path.clone());
            for dep in &artifact.depends_on {
                graph.add_dependency(artifact.path.clone(), dep.clone());
            }
        }

        let order = graph
            .topological_order_by(|path| {
                let stage = needed.get(path).map(|a| a.stage());
                (stage, path.clone())
            })
            .map_err(|cycles| {
                for cycle in &cycles {
                    log.error(
                        Stage::Artifacts,
                        format!("dependency cycle between {}", cycle.join(", ")),
                    );
                }
                ConfigureError::CircularArtifactDependency {
                    artifacts: cycles.into_iter().next().unwrap_or_default(),
                }
            })?;

        for artifact in needed.values() {
            if artifact.stage() != ArtifactStage::Metadata {
                continue;
            }
            for dep in &artifact.depends_on {
                if needed.get(dep).map(|d| d.stage()) == Some(ArtifactStage::Header) {
                    log.error(
                        Stage::Artifacts,
                        format!("`{}` would be generated after header `{}`", artifact.path, dep),
                    );
                    return Err(ConfigureError::StageOrderViolation {
                        artifact: artifact.path.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let artifacts: Vec<GeneratedArtifact> = order
            .iter()
            .filter_map(|path| needed.get(path).cloned())
            .collect();
        log.note(
            Stage::Artifacts,
            format!("planned {} generated artifacts", artifacts.len()),
        );

        let plan = ArtifactPlan { artifacts };
        plan.verify()?;
        Ok(plan)
    }

    /// Every artifact reachable from the roots, keyed by path.
    fn closure(
        &self,
        modules: &[ResolvedModule],
        log: &mut DecisionLog,
    ) -> Result<BTreeMap<String, GeneratedArtifact>, ConfigureError> {
        // (path, who asked for it)
        let mut pending: Vec<(String, String)> = Vec::new();
        for artifact in self.artifacts.values().filter(|a| a.is_config_dump()) {
            pending.push((artifact.path.clone(), "configuration".to_string()));
        }
        for module in modules {
            for header in &module.required_headers {
                pending.push((header.clone(), format!("module `{}`", module.name)));
            }
        }
        pending.reverse();

        let mut needed: BTreeMap<String, GeneratedArtifact> = BTreeMap::new();
        while let Some((path, required_by)) = pending.pop() {
            if needed.contains_key(&path) {
                continue;
            }
            let Some(artifact) = self.artifacts.get(&path) else {
                log.error(
                    Stage::Artifacts,
                    format!("{} needs `{}`, which no generator produces", required_by, path),
                );
                return Err(ConfigureError::UnresolvedArtifactDependency {
                    required_by,
                    missing: path,
                });
            };
            for dep in artifact.depends_on.iter().rev() {
                if !needed.contains_key(dep) {
                    pending.push((dep.clone(), format!("`{}`", artifact.path)));
                }
            }
            needed.insert(path, artifact.clone());
        }
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::Generator;
    use crate::core::module::{InstallDir, ModuleKind};

    fn template(path: &str, deps: &[&str]) -> GeneratedArtifact {
        GeneratedArtifact::new(
            path,
            Generator::TemplateExpansion {
                template: format!("{}.in", path),
            },
        )
        .depends_on(deps)
    }

    fn dump(path: &str) -> GeneratedArtifact {
        GeneratedArtifact::new(path, Generator::ConfigDump)
    }

    fn table(artifacts: Vec<GeneratedArtifact>) -> BTreeMap<String, GeneratedArtifact> {
        artifacts.into_iter().map(|a| (a.path.clone(), a)).collect()
    }

    fn module(name: &str, headers: &[&str]) -> ResolvedModule {
        ResolvedModule {
            name: name.to_string(),
            kind: ModuleKind::Provider,
            dir: "providers".to_string(),
            required_headers: headers.iter().map(|h| h.to_string()).collect(),
            sources: BTreeSet::new(),
            requires_modules: BTreeSet::new(),
            install: InstallDir::None,
        }
    }

    #[test]
    fn test_dependencies_planned_first() {
        let artifacts = table(vec![
            dump("configdata.pm"),
            template("a.h", &["configdata.pm"]),
            template("b.h", &["a.h", "configdata.pm"]),
            template("unused.h", &["configdata.pm"]),
        ]);
        let mut log = DecisionLog::new();
        let plan = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[module("default", &["b.h"])], &mut log)
            .unwrap();

        assert_eq!(plan.paths(), vec!["configdata.pm", "a.h", "b.h"]);
        assert!(!plan.contains("unused.h"));
        plan.verify().unwrap();
    }

    #[test]
    fn test_config_dump_always_planned() {
        let artifacts = table(vec![dump("configdata.pm"), template("a.h", &[])]);
        let mut log = DecisionLog::new();
        let plan = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[], &mut log)
            .unwrap();
        assert_eq!(plan.paths(), vec!["configdata.pm"]);
        assert_eq!(plan.config_dumps().count(), 1);
    }

    #[test]
    fn test_metadata_before_independent_headers() {
        let artifacts = table(vec![dump("zz/configdata.pm"), template("aa.h", &[])]);
        let mut log = DecisionLog::new();
        let plan = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[module("m", &["aa.h"])], &mut log)
            .unwrap();
        assert_eq!(plan.paths(), vec!["zz/configdata.pm", "aa.h"]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let artifacts = table(vec![
            dump("configdata.pm"),
            template("A", &["B"]),
            template("B", &["A"]),
        ]);
        let mut log = DecisionLog::new();
        let err = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[module("m", &["A"])], &mut log)
            .unwrap_err();

        assert_eq!(
            err,
            ConfigureError::CircularArtifactDependency {
                artifacts: vec!["A".to_string(), "B".to_string()]
            }
        );
        assert!(log.render().contains("dependency cycle between A, B"));
    }

    #[test]
    fn test_unknown_header() {
        let artifacts = table(vec![dump("configdata.pm")]);
        let mut log = DecisionLog::new();
        let err = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[module("fips", &["missing.h"])], &mut log)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigureError::UnresolvedArtifactDependency {
                required_by: "module `fips`".to_string(),
                missing: "missing.h".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_transitive_dependency() {
        let artifacts = table(vec![template("a.h", &["gone.h"])]);
        let mut log = DecisionLog::new();
        let err = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[module("m", &["a.h"])], &mut log)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigureError::UnresolvedArtifactDependency { ref required_by, .. } if required_by == "`a.h`"
        ));
    }

    #[test]
    fn test_metadata_may_not_depend_on_header() {
        let artifacts = table(vec![
            dump("configdata.pm").depends_on(&["early.h"]),
            template("early.h", &[]),
        ]);
        let mut log = DecisionLog::new();
        let err = GeneratedArtifactPlanner::new(&artifacts)
            .plan(&[], &mut log)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigureError::StageOrderViolation {
                artifact: "configdata.pm".to_string(),
                dependency: "early.h".to_string(),
            }
        );
    }

    #[test]
    fn test_verify_rejects_out_of_order_plan() {
        let plan = ArtifactPlan {
            artifacts: vec![template("b.h", &["a.h"]), template("a.h", &[])],
        };
        assert!(matches!(
            plan.verify(),
            Err(ConfigureError::InconsistentPlan { .. })
        ));

        let plan = ArtifactPlan {
            artifacts: vec![template("a.h", &[]), dump("configdata.pm")],
        };
        assert!(plan.verify().is_err());
    }
}
