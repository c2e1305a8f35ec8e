//! The package catalog: features, modules, generated artifacts and parity
//! references, loaded from one TOML document.
//!
//! The OpenSSL catalog ships inside the binary. `--catalog <path>` swaps in
//! another document with the same layout.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::builder::parity::ParityReference;
use crate::core::artifact::GeneratedArtifact;
use crate::core::errors::ConfigureError;
use crate::core::feature::{FeatureFlag, FeatureGraph};
use crate::core::module::{ProviderModule, ProviderModuleCatalog};
use crate::core::state::{api_level, PackageInfo, API_RANGE};

const BUILTIN_CATALOG: &str = include_str!("../../data/openssl.toml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    package: PackageInfo,
    #[serde(default, rename = "feature")]
    features: Vec<FeatureFlag>,
    #[serde(default, rename = "module")]
    modules: Vec<ProviderModule>,
    #[serde(default, rename = "artifact")]
    artifacts: Vec<GeneratedArtifact>,
    #[serde(default, rename = "reference")]
    references: Vec<ParityReference>,
}

/// A validated catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    package: PackageInfo,
    features: FeatureGraph,
    modules: ProviderModuleCatalog,
    artifacts: BTreeMap<String, GeneratedArtifact>,
    references: Vec<ParityReference>,
    origin: String,
}

impl Catalog {
    /// The catalog compiled into the binary.
    pub fn builtin() -> Result<Self, ConfigureError> {
        Self::from_toml_str(BUILTIN_CATALOG, "<builtin>")
    }

    /// Load a catalog from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog: {}", path.display()))?;
        let catalog = Self::from_toml_str(&contents, &path.display().to_string())
            .with_context(|| format!("failed to load catalog: {}", path.display()))?;
        Ok(catalog)
    }

    /// Parse and validate a catalog document.
    pub fn from_toml_str(contents: &str, origin: &str) -> Result<Self, ConfigureError> {
        let file: CatalogFile = toml::from_str(contents)
            .map_err(|e| ConfigureError::invalid_catalog(format!("{}: {}", origin, e)))?;

        let package = file.package;
        if package.name.trim().is_empty() {
            return Err(ConfigureError::invalid_catalog("package name is empty"));
        }
        if package.define_prefix.is_empty()
            || !package
                .define_prefix
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigureError::invalid_catalog(format!(
                "define prefix `{}` must be upper-case",
                package.define_prefix
            )));
        }

        if api_level(&package.api_version).is_none() {
            return Err(ConfigureError::invalid_catalog(format!(
                "package api_version `{}`: {}",
                package.api_version, API_RANGE
            )));
        }

        let features = FeatureGraph::new(file.features)?;
        let modules = ProviderModuleCatalog::new(file.modules, &features)?;

        let mut artifacts = BTreeMap::new();
        for artifact in file.artifacts {
            if artifact.path.trim().is_empty() {
                return Err(ConfigureError::invalid_catalog("artifact with an empty path"));
            }
            let path = artifact.path.clone();
            if artifacts.insert(path.clone(), artifact).is_some() {
                return Err(ConfigureError::invalid_catalog(format!(
                    "artifact `{}` is declared twice",
                    path
                )));
            }
        }

        for reference in &file.references {
            for feature in reference.enabled_features.iter().flatten() {
                if !features.contains(feature) {
                    return Err(ConfigureError::invalid_catalog(format!(
                        "parity reference for `{}` names unknown feature `{}`",
                        reference.target, feature
                    )));
                }
            }
        }

        tracing::debug!(
            "loaded catalog {} ({} features, {} modules, {} artifacts)",
            origin,
            features.len(),
            modules.len(),
            artifacts.len()
        );

        Ok(Catalog {
            package,
            features,
            modules,
            artifacts,
            references: file.references,
            origin: origin.to_string(),
        })
    }

    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    pub fn features(&self) -> &FeatureGraph {
        &self.features
    }

    pub fn modules(&self) -> &ProviderModuleCatalog {
        &self.modules
    }

    /// Generated artifacts keyed by path.
    pub fn artifacts(&self) -> &BTreeMap<String, GeneratedArtifact> {
        &self.artifacts
    }

    pub fn artifact(&self, path: &str) -> Option<&GeneratedArtifact> {
        self.artifacts.get(path)
    }

    pub fn references(&self) -> &[ParityReference] {
        &self.references
    }

    /// Where the catalog was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        assert_eq!(catalog.package().name, "openssl");
        assert_eq!(catalog.package().define_prefix, "OPENSSL");
        assert!(catalog.features().contains("fips"));
        assert!(catalog.features().contains("legacy"));
        assert!(catalog.modules().get("crypto").is_some());
        assert!(catalog.artifact("configdata.pm").is_some());
        assert!(!catalog.references().is_empty());
    }

    #[test]
    fn test_builtin_modules_only_name_known_artifacts() {
        let catalog = Catalog::builtin().unwrap();
        for module in catalog.modules().iter() {
            for header in &module.required_generated {
                assert!(
                    catalog.artifact(&header.path).is_some(),
                    "{} needs unknown artifact {}",
                    module.name,
                    header.path
                );
            }
        }
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = Catalog::from_toml_str("[package\nname = ", "broken.toml").unwrap_err();
        assert!(matches!(err, ConfigureError::InvalidCatalog { .. }));
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_rejects_duplicate_artifacts() {
        let doc = r#"
[package]
name = "demo"
version = "1.0.0"
api_version = "1.0.0"
define_prefix = "DEMO"

[[artifact]]
path = "configdata.pm"
generator = { kind = "config-dump" }

[[artifact]]
path = "configdata.pm"
generator = { kind = "config-dump" }
"#;
        let err = Catalog::from_toml_str(doc, "demo").unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }

    #[test]
    fn test_rejects_lowercase_prefix() {
        let doc = r#"
[package]
name = "demo"
version = "1.0.0"
api_version = "1.0.0"
define_prefix = "demo"
"#;
        assert!(Catalog::from_toml_str(doc, "demo").is_err());
    }

    #[test]
    fn test_rejects_unencodable_api_version() {
        let doc = r#"
[package]
name = "demo"
version = "1.0.0"
api_version = "1.0.100"
define_prefix = "DEMO"
"#;
        let err = Catalog::from_toml_str(doc, "demo").unwrap_err();
        assert!(err.to_string().contains("api_version"));
    }
}
