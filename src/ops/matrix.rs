//! Build matrices: many independent configure runs at once.
//!
//! Each entry resolves on its own with the shared, read-only catalog, so
//! entries run in parallel on the rayon pool. One failing entry does not
//! stop the others.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::catalog::Catalog;
use crate::core::errors::ConfigureError;
use crate::core::platform::PlatformResolver;
use crate::core::state::InstallPaths;
use crate::ops::configure::{configure, ConfigureOptions, ConfigureResult};

/// One cell of the matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    pub os: String,
    pub arch: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl MatrixEntry {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        MatrixEntry {
            os: os.into(),
            arch: arch.into(),
            target: None,
            options: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    fn label(&self) -> String {
        let mut label = match self.target {
            Some(ref target) => target.clone(),
            None => format!("{}/{}", self.os, self.arch),
        };
        if !self.options.is_empty() {
            label.push(' ');
            label.push_str(&self.options.join(" "));
        }
        label
    }
}

#[derive(Debug, Deserialize)]
struct MatrixFile {
    #[serde(default, rename = "entry")]
    entries: Vec<MatrixEntry>,
}

/// Load `[[entry]]` tables from a TOML file.
pub fn load_matrix(path: &Path) -> Result<Vec<MatrixEntry>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read matrix: {}", path.display()))?;
    let file: MatrixFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse matrix: {}", path.display()))?;
    Ok(file.entries)
}

/// Every canonical target with no options.
pub fn all_targets() -> Vec<MatrixEntry> {
    PlatformResolver::new()
        .known_targets()
        .iter()
        .map(|t| MatrixEntry {
            os: t.os.as_str().to_string(),
            arch: t.arch.to_string(),
            target: Some(t.id.to_string()),
            options: Vec::new(),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MatrixOptions {
    pub install: InstallPaths,
    /// Write each entry to `<out_dir>/<target>-<fingerprint>`; nothing is
    /// written when unset.
    pub out_dir: Option<PathBuf>,
    pub strict_parity: bool,
}

/// A successful cell.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixSuccess {
    pub target_id: String,
    pub fingerprint: String,
    pub enabled_features: usize,
    pub disabled_features: usize,
    pub modules: usize,
    pub artifacts: usize,
    pub parity_warnings: Vec<String>,
    pub out_dir: Option<PathBuf>,
}

/// The outcome of one cell.
#[derive(Debug, Clone, Serialize)]
pub struct MatrixOutcome {
    pub entry: MatrixEntry,
    pub result: std::result::Result<MatrixSuccess, String>,
}

impl MatrixOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run every entry. Outcomes come back in entry order.
pub fn run_matrix(
    catalog: &Catalog,
    entries: &[MatrixEntry],
    opts: &MatrixOptions,
) -> Vec<MatrixOutcome> {
    tracing::info!("running {} configurations", entries.len());
    entries
        .par_iter()
        .map(|entry| MatrixOutcome {
            entry: entry.clone(),
            result: run_entry(catalog, entry, opts).map_err(|e| match e.downcast_ref::<ConfigureError>() {
                Some(err) => err.to_string(),
                None => format!("{:#}", e),
            }),
        })
        .collect()
}

fn run_entry(catalog: &Catalog, entry: &MatrixEntry, opts: &MatrixOptions) -> Result<MatrixSuccess> {
    let configure_opts = ConfigureOptions {
        os: entry.os.clone(),
        arch: entry.arch.clone(),
        target: entry.target.clone(),
        tokens: entry.options.clone(),
        install: opts.install.clone(),
        out_dir: PathBuf::new(),
        dry_run: true,
        strict_parity: opts.strict_parity,
        extra_references: Vec::new(),
    };

    // The output directory depends on the fingerprint, so resolve in
    // memory first and write the finished descriptor afterwards.
    let result = configure(catalog, &configure_opts)?;
    let Some(ref root) = opts.out_dir else {
        tracing::debug!("{}: ok", entry.label());
        return Ok(summarize(&result, None));
    };

    let config = &result.configuration;
    let fingerprint = config.fingerprint();
    let dir = root.join(format!(
        "{}-{}",
        config.target().canonical_id,
        &fingerprint[..fingerprint.len().min(8)]
    ));
    result.descriptor.write_to(&dir)?;
    tracing::debug!("{}: wrote {}", entry.label(), dir.display());
    Ok(summarize(&result, Some(dir)))
}

fn summarize(result: &ConfigureResult, out_dir: Option<PathBuf>) -> MatrixSuccess {
    let config = &result.configuration;
    MatrixSuccess {
        target_id: config.target().canonical_id.clone(),
        fingerprint: config.fingerprint().to_string(),
        enabled_features: config.enabled_features().len(),
        disabled_features: config.disabled_features().len(),
        modules: result.modules.len(),
        artifacts: result.plan.len(),
        parity_warnings: result.parity.warnings.iter().map(|w| w.to_string()).collect(),
        out_dir,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts(out_dir: Option<PathBuf>) -> MatrixOptions {
        MatrixOptions {
            install: InstallPaths::default(),
            out_dir,
            strict_parity: false,
        }
    }

    #[test]
    fn test_matrix_keeps_entry_order_and_isolates_failures() {
        let catalog = Catalog::builtin().unwrap();
        let entries = vec![
            MatrixEntry::new("linux", "x86_64"),
            MatrixEntry::new("haiku", "x86_64"),
            MatrixEntry::new("linux", "x86_64").with_options(&["enable-legacy", "enable-fips"]),
            MatrixEntry::new("darwin", "arm64"),
        ];
        let outcomes = run_matrix(&catalog, &entries, &opts(None));

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].is_ok());
        assert!(!outcomes[1].is_ok());
        assert!(!outcomes[2].is_ok());
        assert_eq!(
            outcomes[3].result.as_ref().unwrap().target_id,
            "darwin64-arm64-cc"
        );
    }

    #[test]
    fn test_matrix_writes_one_dir_per_entry() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let entries = vec![
            MatrixEntry::new("linux", "x86_64"),
            MatrixEntry::new("linux", "x86_64").with_options(&["no-threads"]),
        ];
        let outcomes = run_matrix(&catalog, &entries, &opts(Some(tmp.path().to_path_buf())));

        let dirs: Vec<PathBuf> = outcomes
            .iter()
            .map(|o| o.result.as_ref().unwrap().out_dir.clone().unwrap())
            .collect();
        assert_ne!(dirs[0], dirs[1]);
        for dir in dirs {
            assert!(dir.join("configdata.json").exists());
        }
    }

    #[test]
    fn test_all_targets_resolve() {
        let catalog = Catalog::builtin().unwrap();
        let outcomes = run_matrix(&catalog, &all_targets(), &opts(None));
        for outcome in outcomes {
            assert!(outcome.is_ok(), "{:?}", outcome.result);
        }
    }

    #[test]
    fn test_load_matrix() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("matrix.toml");
        std::fs::write(
            &path,
            r#"
[[entry]]
os = "linux"
arch = "aarch64"
options = ["no-asm"]

[[entry]]
os = "windows"
arch = "x64"
"#,
        )
        .unwrap();
        let entries = load_matrix(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].options, vec!["no-asm"]);
        assert!(entries[1].options.is_empty());
    }
}
