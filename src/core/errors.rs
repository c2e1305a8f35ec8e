//! Configure error types and diagnostics.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error raised while resolving, planning or emitting a configuration.
///
/// Every variant is fatal for the run that produced it. Nothing is written
/// to the output directory once one of these has been returned.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum ConfigureError {
    #[error("unsupported platform `{os}/{arch}`: {reason}")]
    #[diagnostic(
        code(mooring::platform::unsupported),
        help("Run `mooring targets` to list known target ids")
    )]
    UnsupportedPlatform {
        os: String,
        arch: String,
        reason: String,
    },

    #[error("conflicting feature requirement: `{feature}` and `{other}`")]
    #[diagnostic(
        code(mooring::features::conflict),
        help("Drop one of the conflicting options")
    )]
    ConflictingFeatureRequirement {
        feature: String,
        other: String,
        reason: String,
    },

    #[error("cyclic feature dependency: {}", render_cycle(.cycle))]
    #[diagnostic(code(mooring::features::cycle))]
    CyclicFeatureDependency { cycle: Vec<String> },

    #[error("circular artifact dependency: {}", render_cycle(.artifacts))]
    #[diagnostic(code(mooring::artifacts::cycle))]
    CircularArtifactDependency { artifacts: Vec<String> },

    #[error("unknown feature `{name}`")]
    #[diagnostic(code(mooring::features::unknown))]
    UnknownFeature {
        name: String,
        token: String,
        suggestions: Vec<String>,
    },

    #[error("feature `{feature}` is not available on `{target}`")]
    #[diagnostic(code(mooring::features::unavailable))]
    FeatureUnavailable {
        feature: String,
        target: String,
        required_by: Option<String>,
    },

    #[error("invalid option `{token}`: {reason}")]
    #[diagnostic(code(mooring::options::invalid))]
    InvalidOption { token: String, reason: String },

    #[error("`{required_by}` needs `{missing}`, which no generator produces")]
    #[diagnostic(code(mooring::artifacts::unresolved))]
    UnresolvedArtifactDependency {
        required_by: String,
        missing: String,
    },

    #[error("metadata artifact `{artifact}` depends on header artifact `{dependency}`")]
    #[diagnostic(code(mooring::artifacts::stage_order))]
    StageOrderViolation { artifact: String, dependency: String },

    #[error("module `{module}` requires module `{missing}`, which is not enabled")]
    #[diagnostic(code(mooring::modules::missing))]
    MissingModuleDependency { module: String, missing: String },

    #[error("invalid catalog: {message}")]
    #[diagnostic(code(mooring::catalog::invalid))]
    InvalidCatalog { message: String },

    #[error("refusing to emit descriptors: {message}")]
    #[diagnostic(code(mooring::emit::inconsistent_plan))]
    InconsistentPlan { message: String },

    #[error("incomplete generation for `{target}`")]
    #[diagnostic(code(mooring::parity::incomplete))]
    IncompleteGeneration { target: String, details: Vec<String> },
}

fn render_cycle(nodes: &[String]) -> String {
    let mut parts: Vec<&str> = nodes.iter().map(String::as_str).collect();
    if let Some(first) = nodes.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}

impl ConfigureError {
    pub(crate) fn invalid_catalog(message: impl Into<String>) -> Self {
        ConfigureError::InvalidCatalog {
            message: message.into(),
        }
    }

    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ConfigureError::UnsupportedPlatform { os, arch, reason } => {
                Diagnostic::error(format!("unsupported platform `{}/{}`", os, arch))
                    .with_context(reason.clone())
                    .with_suggestion(suggestions::UNKNOWN_TARGET)
                    .with_suggestion("Pass `--target <id>` to select a canonical target directly")
            }

            ConfigureError::ConflictingFeatureRequirement {
                feature,
                other,
                reason,
            } => Diagnostic::error(format!(
                "conflicting feature requirement: `{}` and `{}`",
                feature, other
            ))
            .with_context(reason.clone())
            .with_suggestion(format!("Drop the option that selects `{}`", feature))
            .with_suggestion(format!("Drop the option that selects `{}`", other))
            .with_suggestion(suggestions::FEATURE_CONFLICT),

            ConfigureError::CyclicFeatureDependency { cycle } => {
                Diagnostic::error("cyclic feature dependency")
                    .with_context(format!("cycle: {}", render_cycle(cycle)))
                    .with_suggestion(suggestions::INVALID_CATALOG)
            }

            ConfigureError::CircularArtifactDependency { artifacts } => {
                Diagnostic::error("circular artifact dependency")
                    .with_context(format!("cycle: {}", render_cycle(artifacts)))
                    .with_suggestion("Remove one `depends_on` edge from the cycle")
            }

            ConfigureError::UnknownFeature {
                name,
                token,
                suggestions: similar,
            } => {
                let mut diag = Diagnostic::error(format!("unknown feature `{}`", name))
                    .with_context(format!("in option `{}`", token));
                if !similar.is_empty() {
                    diag = diag.with_context(format!("did you mean: {}?", similar.join(", ")));
                }
                diag.with_suggestion(suggestions::UNKNOWN_FEATURE)
            }

            ConfigureError::FeatureUnavailable {
                feature,
                target,
                required_by,
            } => {
                let mut diag = Diagnostic::error(format!(
                    "feature `{}` is not available on `{}`",
                    feature, target
                ));
                if let Some(requirer) = required_by {
                    diag = diag.with_context(format!("required by `{}`", requirer));
                }
                diag.with_suggestion(format!("Remove `enable-{}`", feature))
                    .with_suggestion(suggestions::UNKNOWN_FEATURE)
            }

            ConfigureError::InvalidOption { token, reason } => {
                Diagnostic::error(format!("invalid option `{}`", token))
                    .with_context(reason.clone())
                    .with_suggestion("Options are `enable-<f>`, `no-<f>`, `<f>`, `-D<name>[=<v>]`, `-l<lib>`, `-L<dir>`, `--api=<x.y.z>` or compiler flags")
            }

            ConfigureError::UnresolvedArtifactDependency {
                required_by,
                missing,
            } => Diagnostic::error(format!("no generator produces `{}`", missing))
                .with_context(format!("needed by `{}`", required_by))
                .with_suggestion("Add an [[artifact]] entry for the missing path")
                .with_suggestion(suggestions::INVALID_CATALOG),

            ConfigureError::StageOrderViolation {
                artifact,
                dependency,
            } => Diagnostic::error("stage order violation")
                .with_context(format!(
                    "metadata artifact `{}` depends on header artifact `{}`",
                    artifact, dependency
                ))
                .with_context("configuration metadata must not depend on generated headers")
                .with_suggestion(format!("Remove `{}` from the `depends_on` of `{}`", dependency, artifact)),

            ConfigureError::MissingModuleDependency { module, missing } => Diagnostic::error(
                format!("module `{}` requires module `{}`", module, missing),
            )
            .with_context(format!("`{}` is disabled by the current feature set", missing))
            .with_suggestion(format!("Enable the features `{}` needs", missing)),

            ConfigureError::InvalidCatalog { message } => {
                Diagnostic::error("invalid catalog")
                    .with_context(message.clone())
                    .with_suggestion(suggestions::INVALID_CATALOG)
            }

            ConfigureError::InconsistentPlan { message } => {
                Diagnostic::error("refusing to emit descriptors")
                    .with_context(message.clone())
            }

            ConfigureError::IncompleteGeneration { target, details } => {
                let mut diag =
                    Diagnostic::error(format!("incomplete generation for `{}`", target));
                for detail in details {
                    diag = diag.with_context(detail.clone());
                }
                diag.with_suggestion(suggestions::INCOMPLETE_GENERATION)
            }
        }
    }
}
