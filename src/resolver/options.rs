//! Parsing of legacy configure-style option tokens.
//!
//! Accepted forms:
//! - `enable-<f>`, `<f>` enable a feature; `no-<f>` disables it
//! - `-D<name>[=<value>]` adds a define
//! - `-l<lib>`, `-L<dir>`, `-Wl,<flags>` are passed to the link step
//! - `--api=<x.y.z>` selects the API compatibility level
//! - any other `-<flag>` is passed to the compiler verbatim

use semver::Version;

use crate::core::errors::ConfigureError;
use crate::core::feature::FeatureGraph;
use crate::core::state::{api_level, API_RANGE};

/// Whether an override turns a feature on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideAction {
    Enable,
    Disable,
}

/// A single user request for a feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureOverride {
    pub feature: String,
    pub action: OverrideAction,
    /// The token this came from, for diagnostics.
    pub token: String,
}

/// Everything a token list asks for, in token order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOptions {
    pub overrides: Vec<FeatureOverride>,
    pub defines: Vec<String>,
    pub link_flags: Vec<String>,
    pub compiler_flags: Vec<String>,
    pub api_version: Option<Version>,
    /// The normalized tokens, used to reproduce the run.
    pub tokens: Vec<String>,
}

/// Parse `tokens` against the known feature set.
pub fn parse_tokens<S: AsRef<str>>(
    tokens: &[S],
    features: &FeatureGraph,
) -> Result<ParsedOptions, ConfigureError> {
    let mut parsed = ParsedOptions::default();

    for raw in tokens {
        let token = raw.as_ref().trim();
        if token.is_empty() {
            continue;
        }
        if token.chars().any(char::is_control) {
            return Err(ConfigureError::InvalidOption {
                token: token.escape_debug().to_string(),
                reason: "contains a control character".to_string(),
            });
        }
        parsed.tokens.push(token.to_string());

        if let Some(rest) = token.strip_prefix("--api=") {
            parsed.api_version = Some(parse_api(token, rest)?);
        } else if token.starts_with("--") {
            return Err(ConfigureError::InvalidOption {
                token: token.to_string(),
                reason: "unknown long option".to_string(),
            });
        } else if let Some(define) = token.strip_prefix("-D") {
            let name = define.split('=').next().unwrap_or_default();
            if name.is_empty() {
                return Err(ConfigureError::InvalidOption {
                    token: token.to_string(),
                    reason: "define has no name".to_string(),
                });
            }
            parsed.defines.push(define.to_string());
        } else if token.starts_with("-l") || token.starts_with("-L") || token.starts_with("-Wl,") {
            parsed.link_flags.push(token.to_string());
        } else if token.starts_with('-') {
            parsed.compiler_flags.push(token.to_string());
        } else {
            parsed.overrides.push(parse_feature_token(token, features)?);
        }
    }

    Ok(parsed)
}

fn parse_feature_token(token: &str, features: &FeatureGraph) -> Result<FeatureOverride, ConfigureError> {
    let lowered = token.to_ascii_lowercase();
    let (name, action) = if let Some(name) = lowered.strip_prefix("enable-") {
        (name, OverrideAction::Enable)
    } else if let Some(name) = lowered.strip_prefix("no-") {
        (name, OverrideAction::Disable)
    } else {
        (lowered.as_str(), OverrideAction::Enable)
    };

    if !features.contains(name) {
        return Err(ConfigureError::UnknownFeature {
            name: name.to_string(),
            token: token.to_string(),
            suggestions: features.suggestions(name),
        });
    }

    Ok(FeatureOverride {
        feature: name.to_string(),
        action,
        token: token.to_string(),
    })
}

fn parse_api(token: &str, value: &str) -> Result<Version, ConfigureError> {
    let padded = match value.matches('.').count() {
        0 => format!("{}.0.0", value),
        1 => format!("{}.0", value),
        _ => value.to_string(),
    };
    let version = Version::parse(&padded).map_err(|e| ConfigureError::InvalidOption {
        token: token.to_string(),
        reason: format!("`{}` is not a version: {}", value, e),
    })?;
    if api_level(&version).is_none() {
        return Err(ConfigureError::InvalidOption {
            token: token.to_string(),
            reason: API_RANGE.to_string(),
        });
    }
    Ok(version)
}
