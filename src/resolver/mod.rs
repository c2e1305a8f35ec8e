//! Feature resolution.
//!
//! Turns platform defaults plus user overrides into one consistent set of
//! enabled and disabled features. Resolution runs in three steps:
//!
//! 1. Seed every feature from its default, or disable it when it does not
//!    exist on the target. Apply user overrides on top; the last override
//!    for a feature wins.
//! 2. Enable the full requirement closure of every user-enabled feature.
//!    A required feature the user disabled is a conflict.
//! 3. Cascade-disable anything whose requirement is gone, then apply
//!    exclusions, until nothing changes. These passes only ever disable, so
//!    they settle well within `2n + 1` passes for `n` features.

mod options;

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;

use crate::core::errors::ConfigureError;
use crate::core::feature::FeatureGraph;
use crate::core::platform::TargetPlatform;
use crate::util::log::{DecisionLog, Stage};

pub use options::{parse_tokens, FeatureOverride, OverrideAction, ParsedOptions};

/// Why a feature ended up in its state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "by", rename_all = "snake_case")]
pub enum Origin {
    /// The catalog default for this target.
    Default,
    /// An explicit user option.
    User,
    /// Enabled because a user-enabled feature requires it.
    Required(String),
    /// Disabled because an enabled feature excludes it.
    Excluded(String),
    /// Disabled because something it requires is disabled.
    Cascade(String),
    /// Does not exist on this target.
    Unavailable,
}

impl Origin {
    /// The label the legacy dump uses in `%disabled`.
    pub fn legacy_label(&self) -> &'static str {
        match self {
            Origin::Default => "default",
            Origin::User => "option",
            Origin::Required(_) => "required",
            Origin::Excluded(_) => "excluded",
            Origin::Cascade(_) => "cascade",
            Origin::Unavailable => "not-available",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Default => write!(f, "default"),
            Origin::User => write!(f, "option"),
            Origin::Required(by) => write!(f, "required by `{}`", by),
            Origin::Excluded(by) => write!(f, "excluded by `{}`", by),
            Origin::Cascade(by) => write!(f, "requires disabled `{}`", by),
            Origin::Unavailable => write!(f, "not available on this target"),
        }
    }
}

/// Final state of one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureState {
    pub enabled: bool,
    pub origin: Origin,
}

/// The outcome of feature resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFeatures {
    states: BTreeMap<String, FeatureState>,
}

impl ResolvedFeatures {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.states.get(name).is_some_and(|s| s.enabled)
    }

    pub fn state(&self, name: &str) -> Option<&FeatureState> {
        self.states.get(name)
    }

    pub fn enabled(&self) -> BTreeSet<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.enabled)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn disabled(&self) -> BTreeSet<String> {
        self.states
            .iter()
            .filter(|(_, s)| !s.enabled)
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// All features in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureState)> {
        self.states.iter().map(|(n, s)| (n.as_str(), s))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Check that every feature is accounted for, every enabled feature's
    /// requirements are enabled and no two enabled features exclude each
    /// other.
    pub fn verify(&self, graph: &FeatureGraph) -> Result<(), ConfigureError> {
        if let Some(unknown) = self.states.keys().find(|n| !graph.contains(n)) {
            return Err(ConfigureError::invalid_catalog(format!(
                "resolved feature `{}` is not in the catalog",
                unknown
            )));
        }
        for flag in graph.iter() {
            let Some(state) = self.states.get(&flag.name) else {
                return Err(ConfigureError::invalid_catalog(format!(
                    "feature `{}` was never resolved",
                    flag.name
                )));
            };
            if !state.enabled {
                continue;
            }
            if let Some(dep) = flag.requires.iter().find(|d| !self.is_enabled(d)) {
                return Err(ConfigureError::ConflictingFeatureRequirement {
                    feature: flag.name.clone(),
                    other: dep.clone(),
                    reason: format!(
                        "`{}` is enabled but its requirement `{}` is not",
                        flag.name, dep
                    ),
                });
            }
            if let Some(other) = flag.excludes.iter().find(|x| self.is_enabled(x)) {
                return Err(ConfigureError::ConflictingFeatureRequirement {
                    feature: other.clone(),
                    other: flag.name.clone(),
                    reason: format!("`{}` excludes `{}` but both are enabled", flag.name, other),
                });
            }
        }
        Ok(())
    }
}

/// Resolves features for one target.
pub struct FeatureResolver<'a> {
    graph: &'a FeatureGraph,
    platform: &'a TargetPlatform,
}

impl<'a> FeatureResolver<'a> {
    pub fn new(graph: &'a FeatureGraph, platform: &'a TargetPlatform) -> Self {
        FeatureResolver { graph, platform }
    }

    /// Resolve `overrides` against the target defaults.
    pub fn resolve(
        &self,
        overrides: &[FeatureOverride],
        log: &mut DecisionLog,
    ) -> Result<ResolvedFeatures, ConfigureError> {
        let mut states = self.seed(log);
        let last = self.apply_overrides(&mut states, overrides, log)?;
        let forced = self.enable_requirements(&mut states, &last, log)?;
        self.settle(&mut states, &forced, log)?;

        let resolved = ResolvedFeatures { states };
        resolved.verify(self.graph)?;

        log.note(
            Stage::Features,
            format!(
                "{} enabled, {} disabled on `{}`",
                resolved.enabled().len(),
                resolved.disabled().len(),
                self.platform.canonical_id
            ),
        );
        Ok(resolved)
    }

    fn seed(&self, log: &mut DecisionLog) -> BTreeMap<String, FeatureState> {
        let mut states = BTreeMap::new();
        for flag in self.graph.iter() {
            let state = if flag.available_on(self.platform) {
                FeatureState {
                    enabled: flag.default_enabled,
                    origin: Origin::Default,
                }
            } else {
                if flag.default_enabled {
                    log.note(
                        Stage::Features,
                        format!(
                            "`{}` is not available on `{}`",
                            flag.name, self.platform.canonical_id
                        ),
                    );
                }
                FeatureState {
                    enabled: false,
                    origin: Origin::Unavailable,
                }
            };
            states.insert(flag.name.clone(), state);
        }
        states
    }

    /// Apply user overrides. Returns the effective override per feature.
    fn apply_overrides<'o>(
        &self,
        states: &mut BTreeMap<String, FeatureState>,
        overrides: &'o [FeatureOverride],
        log: &mut DecisionLog,
    ) -> Result<BTreeMap<String, &'o FeatureOverride>, ConfigureError> {
        let mut last: BTreeMap<String, &FeatureOverride> = BTreeMap::new();
        for o in overrides {
            if !self.graph.contains(&o.feature) {
                return Err(ConfigureError::UnknownFeature {
                    name: o.feature.clone(),
                    token: o.token.clone(),
                    suggestions: self.graph.suggestions(&o.feature),
                });
            }
            if let Some(previous) = last.insert(o.feature.clone(), o) {
                if previous.action != o.action {
                    log.note(
                        Stage::Options,
                        format!("`{}` overrides earlier `{}`", o.token, previous.token),
                    );
                }
            }
        }

        for (name, o) in &last {
            let Some(state) = states.get_mut(name) else {
                continue;
            };
            match o.action {
                OverrideAction::Enable => {
                    if state.origin == Origin::Unavailable {
                        log.error(
                            Stage::Features,
                            format!(
                                "`{}` asks for `{}`, which does not exist on `{}`",
                                o.token, name, self.platform.canonical_id
                            ),
                        );
                        return Err(ConfigureError::FeatureUnavailable {
                            feature: name.clone(),
                            target: self.platform.canonical_id.clone(),
                            required_by: None,
                        });
                    }
                    *state = FeatureState {
                        enabled: true,
                        origin: Origin::User,
                    };
                    log.note(Stage::Features, format!("enable `{}` ({})", name, o.token));
                }
                OverrideAction::Disable => {
                    if state.origin == Origin::Unavailable {
                        log.note(
                            Stage::Features,
                            format!("`{}` is already unavailable; `{}` has no effect", name, o.token),
                        );
                        continue;
                    }
                    *state = FeatureState {
                        enabled: false,
                        origin: Origin::User,
                    };
                    log.note(Stage::Features, format!("disable `{}` ({})", name, o.token));
                }
            }
        }
        Ok(last)
    }

    /// Enable the requirement closure of every user-enabled feature.
    ///
    /// Returns the forced set: each forced feature mapped to the feature
    /// that pulled it in, or `None` for the user-enabled roots.
    fn enable_requirements(
        &self,
        states: &mut BTreeMap<String, FeatureState>,
        overrides: &BTreeMap<String, &FeatureOverride>,
        log: &mut DecisionLog,
    ) -> Result<BTreeMap<String, Option<String>>, ConfigureError> {
        let mut forced: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut queue = VecDeque::new();
        for (name, state) in states.iter() {
            if state.enabled && state.origin == Origin::User {
                forced.insert(name.clone(), None);
                queue.push_back(name.clone());
            }
        }

        while let Some(current) = queue.pop_front() {
            let Some(flag) = self.graph.get(&current) else {
                continue;
            };
            for dep in &flag.requires {
                if !forced.contains_key(dep) {
                    forced.insert(dep.clone(), Some(current.clone()));
                    queue.push_back(dep.clone());
                }
            }
        }

        for (name, requirer) in &forced {
            let Some(requirer) = requirer else {
                continue;
            };
            let Some(state) = states.get_mut(name) else {
                continue;
            };
            if state.enabled {
                continue;
            }
            match state.origin {
                Origin::User => {
                    let token = overrides
                        .get(name)
                        .map(|o| o.token.as_str())
                        .unwrap_or("an option");
                    let reason = format!(
                        "`{}` requires `{}`, which was disabled by `{}`",
                        requirer, name, token
                    );
                    log.error(Stage::Features, reason.clone());
                    return Err(ConfigureError::ConflictingFeatureRequirement {
                        feature: requirer.clone(),
                        other: name.clone(),
                        reason,
                    });
                }
                Origin::Unavailable => {
                    log.error(
                        Stage::Features,
                        format!(
                            "`{}` requires `{}`, which does not exist on `{}`",
                            requirer, name, self.platform.canonical_id
                        ),
                    );
                    return Err(ConfigureError::FeatureUnavailable {
                        feature: name.clone(),
                        target: self.platform.canonical_id.clone(),
                        required_by: Some(requirer.clone()),
                    });
                }
                _ => {
                    *state = FeatureState {
                        enabled: true,
                        origin: Origin::Required(requirer.clone()),
                    };
                    log.note(
                        Stage::Features,
                        format!("enable `{}` (required by `{}`)", name, requirer),
                    );
                }
            }
        }

        Ok(forced)
    }

    /// Cascade-disable and apply exclusions until the state stops changing.
    ///
    /// Cascades run first in each pass, so a feature that is about to lose
    /// a requirement no longer excludes anything.
    fn settle(
        &self,
        states: &mut BTreeMap<String, FeatureState>,
        forced: &BTreeMap<String, Option<String>>,
        log: &mut DecisionLog,
    ) -> Result<(), ConfigureError> {
        let limit = 2 * self.graph.len() + 1;
        let mut changed: Vec<String> = Vec::new();

        for _ in 0..limit {
            changed.clear();

            for flag in self.graph.iter() {
                if forced.contains_key(&flag.name)
                    || !states.get(&flag.name).is_some_and(|s| s.enabled)
                {
                    continue;
                }
                let missing = flag
                    .requires
                    .iter()
                    .find(|r| !states.get(*r).is_some_and(|s| s.enabled))
                    .cloned();
                if let Some(missing) = missing {
                    log.note(
                        Stage::Features,
                        format!("disable `{}` (requires disabled `{}`)", flag.name, missing),
                    );
                    states.insert(
                        flag.name.clone(),
                        FeatureState {
                            enabled: false,
                            origin: Origin::Cascade(missing),
                        },
                    );
                    changed.push(flag.name.clone());
                }
            }

            for flag in self.graph.iter() {
                if !states.get(&flag.name).is_some_and(|s| s.enabled) {
                    continue;
                }
                for other in &flag.excludes {
                    if !states.get(other).is_some_and(|s| s.enabled) {
                        continue;
                    }
                    if let Some(requirer) = forced.get(other) {
                        let reason = match requirer {
                            None => format!(
                                "`{}` excludes `{}`, which was explicitly enabled",
                                flag.name, other
                            ),
                            Some(r) => format!(
                                "`{}` excludes `{}`, which `{}` requires",
                                flag.name, other, r
                            ),
                        };
                        log.error(Stage::Features, reason.clone());
                        return Err(ConfigureError::ConflictingFeatureRequirement {
                            feature: other.clone(),
                            other: flag.name.clone(),
                            reason,
                        });
                    }
                    states.insert(
                        other.clone(),
                        FeatureState {
                            enabled: false,
                            origin: Origin::Excluded(flag.name.clone()),
                        },
                    );
                    log.note(
                        Stage::Features,
                        format!("disable `{}` (excluded by `{}`)", other, flag.name),
                    );
                    changed.push(other.clone());
                }
            }

            if changed.is_empty() {
                return Ok(());
            }
        }

        Err(ConfigureError::CyclicFeatureDependency { cycle: changed })
    }
}
