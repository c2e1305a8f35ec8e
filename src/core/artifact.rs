//! Files produced at configure or build time rather than hand-authored.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Generation stage. Metadata is produced before any header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStage {
    Metadata,
    Header,
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactStage::Metadata => write!(f, "metadata"),
            ArtifactStage::Header => write!(f, "header"),
        }
    }
}

/// How an artifact is produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Generator {
    /// Expand a template against the configuration dump.
    TemplateExpansion { template: String },
    /// Derive an export list from an ordinals file.
    SymbolTable { ordinals: String, library: String },
    /// Dump the resolved configuration itself.
    ConfigDump,
}

impl Generator {
    pub fn kind(&self) -> &'static str {
        match self {
            Generator::TemplateExpansion { .. } => "template-expansion",
            Generator::SymbolTable { .. } => "symbol-table",
            Generator::ConfigDump => "config-dump",
        }
    }
}

/// A generated file and the artifacts it is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub path: String,
    pub generator: Generator,
    #[serde(default)]
    pub depends_on: BTreeSet<String>,
}

impl GeneratedArtifact {
    pub fn new(path: impl Into<String>, generator: Generator) -> Self {
        GeneratedArtifact {
            path: path.into(),
            generator,
            depends_on: BTreeSet::new(),
        }
    }

    pub fn depends_on(mut self, paths: &[&str]) -> Self {
        self.depends_on.extend(paths.iter().map(|p| p.to_string()));
        self
    }

    pub fn stage(&self) -> ArtifactStage {
        match self.generator {
            Generator::ConfigDump => ArtifactStage::Metadata,
            _ => ArtifactStage::Header,
        }
    }

    pub fn is_config_dump(&self) -> bool {
        matches!(self.generator, Generator::ConfigDump)
    }
}
