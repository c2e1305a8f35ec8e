//! Parity checks on the emitted configuration dump.
//!
//! A dump that is much smaller than a known-good one for the same target
//! usually means a generation step silently produced nothing. The validator
//! reads the dump back from disk and compares a few coarse metrics against
//! reference lower bounds.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::fs::read_bytes;

/// Lower bounds observed on a known-good configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParityReference {
    pub target: String,

    /// Restrict the reference to one exact enabled-feature set.
    #[serde(default)]
    pub enabled_features: Option<BTreeSet<String>>,

    #[serde(default)]
    pub min_dump_bytes: u64,

    #[serde(default)]
    pub min_dump_keys: u64,

    #[serde(default)]
    pub min_disabled_features: u64,
}

#[derive(Debug, Deserialize)]
struct ReferenceFile {
    #[serde(default, rename = "reference")]
    references: Vec<ParityReference>,
}

/// Load `[[reference]]` tables from a TOML file.
pub fn load_references(path: &Path) -> Result<Vec<ParityReference>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read parity references: {}", path.display()))?;
    let file: ReferenceFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse parity references: {}", path.display()))?;
    Ok(file.references)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityMetric {
    DumpBytes,
    DumpKeys,
    DisabledFeatures,
}

impl fmt::Display for ParityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityMetric::DumpBytes => write!(f, "dump size in bytes"),
            ParityMetric::DumpKeys => write!(f, "dump key count"),
            ParityMetric::DisabledFeatures => write!(f, "disabled feature count"),
        }
    }
}

/// One metric below its reference bound.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{target}: {metric} is {observed}, expected at least {expected}")]
pub struct IncompleteGenerationWarning {
    pub target: String,
    pub metric: ParityMetric,
    pub observed: u64,
    pub expected: u64,
}

/// What was measured on a dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DumpMeasurement {
    pub target_id: String,
    pub bytes: u64,
    pub keys: u64,
    pub disabled_features: u64,
    pub enabled_features: BTreeSet<String>,
}

impl DumpMeasurement {
    /// Measure a JSON dump.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).context("configuration dump is not valid JSON")?;
        let target_id = value
            .get("target_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let names = |key: &str| -> BTreeSet<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(DumpMeasurement {
            target_id,
            bytes: bytes.len() as u64,
            keys: count_keys(&value),
            disabled_features: names("disabled_features").len() as u64,
            enabled_features: names("enabled_features"),
        })
    }

    /// Read and measure a dump file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = read_bytes(path)?;
        Self::from_json(&bytes).with_context(|| format!("failed to measure {}", path.display()))
    }
}

/// Number of object keys at every nesting level.
fn count_keys(value: &Value) -> u64 {
    match value {
        Value::Object(map) => map
            .values()
            .map(count_keys)
            .fold(map.len() as u64, |acc, n| acc + n),
        Value::Array(items) => items.iter().map(count_keys).sum(),
        _ => 0,
    }
}

/// The result of one parity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityReport {
    pub measurement: DumpMeasurement,
    pub reference: Option<ParityReference>,
    pub warnings: Vec<IncompleteGenerationWarning>,
}

impl ParityReport {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Compares dumps against reference bounds.
///
/// A target-wide reference describes the default feature set. When the
/// target's defaults are known, every feature enabled beyond them lowers the
/// disabled-feature bound by one.
#[derive(Debug, Clone, Default)]
pub struct ParityValidator {
    references: Vec<ParityReference>,
    defaults: BTreeMap<String, BTreeSet<String>>,
}

impl ParityValidator {
    pub fn new(references: Vec<ParityReference>) -> Self {
        ParityValidator {
            references,
            defaults: BTreeMap::new(),
        }
    }

    /// Record the default enabled set for a target.
    pub fn set_defaults(&mut self, target: impl Into<String>, defaults: BTreeSet<String>) {
        self.defaults.insert(target.into(), defaults);
    }

    pub fn add_references(&mut self, references: impl IntoIterator<Item = ParityReference>) {
        self.references.extend(references);
    }

    /// The reference that applies: an exact enabled-set match first, then
    /// a target-wide entry. Later entries win among equals, so references
    /// added on top of the catalog take precedence.
    pub fn reference_for(
        &self,
        target: &str,
        enabled: &BTreeSet<String>,
    ) -> Option<&ParityReference> {
        let for_target = || self.references.iter().rev().filter(move |r| r.target == target);
        for_target()
            .find(|r| r.enabled_features.as_ref() == Some(enabled))
            .or_else(|| for_target().find(|r| r.enabled_features.is_none()))
    }

    /// The reference that applies, with a target-wide disabled bound lowered
    /// for features enabled beyond the target defaults.
    fn effective_reference(&self, measurement: &DumpMeasurement) -> Option<ParityReference> {
        let mut reference = self
            .reference_for(&measurement.target_id, &measurement.enabled_features)?
            .clone();
        if reference.enabled_features.is_some() {
            return Some(reference);
        }
        if let Some(defaults) = self.defaults.get(&measurement.target_id) {
            let extra = measurement.enabled_features.difference(defaults).count() as u64;
            if extra > 0 {
                tracing::debug!(
                    "{} features beyond the `{}` defaults, disabled bound {} -> {}",
                    extra,
                    measurement.target_id,
                    reference.min_disabled_features,
                    reference.min_disabled_features.saturating_sub(extra)
                );
                reference.min_disabled_features =
                    reference.min_disabled_features.saturating_sub(extra);
            }
        }
        Some(reference)
    }

    /// Check a measurement. No reference means nothing to compare against,
    /// which is not a failure.
    pub fn check(&self, measurement: DumpMeasurement) -> ParityReport {
        let reference = self.effective_reference(&measurement);

        let mut warnings = Vec::new();
        if let Some(ref reference) = reference {
            let checks = [
                (ParityMetric::DumpBytes, measurement.bytes, reference.min_dump_bytes),
                (ParityMetric::DumpKeys, measurement.keys, reference.min_dump_keys),
                (
                    ParityMetric::DisabledFeatures,
                    measurement.disabled_features,
                    reference.min_disabled_features,
                ),
            ];
            for (metric, observed, expected) in checks {
                if observed < expected {
                    let warning = IncompleteGenerationWarning {
                        target: measurement.target_id.clone(),
                        metric,
                        observed,
                        expected,
                    };
                    tracing::warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        } else {
            tracing::debug!("no parity reference for `{}`", measurement.target_id);
        }

        ParityReport {
            measurement,
            reference,
            warnings,
        }
    }

    /// Read a dump from disk and check it.
    pub fn validate_file(&self, path: &Path) -> Result<ParityReport> {
        Ok(self.check(DumpMeasurement::from_file(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn reference(target: &str, enabled: Option<&[&str]>, bytes: u64) -> ParityReference {
        ParityReference {
            target: target.to_string(),
            enabled_features: enabled.map(|e| e.iter().map(|s| s.to_string()).collect()),
            min_dump_bytes: bytes,
            min_dump_keys: 3,
            min_disabled_features: 2,
        }
    }

    fn dump(disabled: &[&str]) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "target_id": "linux-x86_64",
            "enabled_features": ["asm"],
            "disabled_features": disabled,
            "install": { "prefix": "/usr/local" },
        }))
        .unwrap()
    }

    #[test]
    fn test_counts_nested_keys() {
        let m = DumpMeasurement::from_json(&dump(&["fips"])).unwrap();
        assert_eq!(m.keys, 5);
        assert_eq!(m.disabled_features, 1);
        assert_eq!(m.target_id, "linux-x86_64");
    }

    #[test]
    fn test_complete_dump_has_no_warnings() {
        let validator = ParityValidator::new(vec![reference("linux-x86_64", None, 10)]);
        let report = validator.check(DumpMeasurement::from_json(&dump(&["fips", "legacy"])).unwrap());
        assert!(report.is_complete());
        assert!(report.reference.is_some());
    }

    #[test]
    fn test_truncated_dump_warns_per_metric() {
        let validator = ParityValidator::new(vec![reference("linux-x86_64", None, 100_000)]);
        let report = validator.check(DumpMeasurement::from_json(&dump(&[])).unwrap());
        let metrics: Vec<ParityMetric> = report.warnings.iter().map(|w| w.metric).collect();
        assert_eq!(
            metrics,
            vec![ParityMetric::DumpBytes, ParityMetric::DisabledFeatures]
        );
    }

    #[test]
    fn test_exact_feature_set_wins() {
        let validator = ParityValidator::new(vec![
            reference("linux-x86_64", None, 1),
            reference("linux-x86_64", Some(&["asm"]), 100_000),
        ]);
        let report = validator.check(DumpMeasurement::from_json(&dump(&["a", "b"])).unwrap());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].metric, ParityMetric::DumpBytes);
    }

    #[test]
    fn test_features_beyond_defaults_lower_the_disabled_bound() {
        let mut validator = ParityValidator::new(vec![reference("linux-x86_64", None, 1)]);
        validator.set_defaults("linux-x86_64", BTreeSet::new());
        let report = validator.check(DumpMeasurement::from_json(&dump(&["fips"])).unwrap());
        assert!(report.is_complete());
        assert_eq!(report.reference.unwrap().min_disabled_features, 1);
    }

    #[test]
    fn test_default_feature_set_keeps_the_full_bound() {
        let mut validator = ParityValidator::new(vec![reference("linux-x86_64", None, 1)]);
        validator.set_defaults("linux-x86_64", ["asm".to_string()].into_iter().collect());
        let report = validator.check(DumpMeasurement::from_json(&dump(&["fips"])).unwrap());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].metric, ParityMetric::DisabledFeatures);
        assert_eq!(report.warnings[0].expected, 2);
    }

    #[test]
    fn test_exact_reference_is_not_adjusted() {
        let mut validator =
            ParityValidator::new(vec![reference("linux-x86_64", Some(&["asm"]), 1)]);
        validator.set_defaults("linux-x86_64", BTreeSet::new());
        let report = validator.check(DumpMeasurement::from_json(&dump(&["fips"])).unwrap());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].expected, 2);
    }

    #[test]
    fn test_unknown_target_is_not_checked() {
        let validator = ParityValidator::new(vec![reference("VC-WIN64A", None, 100_000)]);
        let report = validator.check(DumpMeasurement::from_json(&dump(&[])).unwrap());
        assert!(report.reference.is_none());
        assert!(report.is_complete());
    }

    #[test]
    fn test_validate_file_and_references() {
        let tmp = TempDir::new().unwrap();
        let dump_path = tmp.path().join("configdata.json");
        std::fs::write(&dump_path, dump(&["fips", "legacy"])).unwrap();

        let refs_path = tmp.path().join("refs.toml");
        std::fs::write(
            &refs_path,
            r#"
[[reference]]
target = "linux-x86_64"
min_dump_bytes = 1
min_disabled_features = 3
"#,
        )
        .unwrap();

        let validator = ParityValidator::new(load_references(&refs_path).unwrap());
        let report = validator.validate_file(&dump_path).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].observed, 2);
        assert_eq!(report.warnings[0].expected, 3);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(DumpMeasurement::from_json(b"our %config = (").is_err());
    }
}
