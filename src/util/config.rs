//! Configuration file support for Mooring.
//!
//! Mooring reads two configuration file locations:
//! - Global: `~/.mooring/config.toml` - User-wide defaults
//! - Project: `.mooring/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::InstallPaths;

/// Mooring configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Defaults for `mooring configure`
    pub configure: ConfigureConfig,

    /// Parity checking
    pub parity: ParityConfig,
}

/// Defaults applied to every configure run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigureConfig {
    /// Installation prefix (default `/usr/local`)
    pub prefix: Option<String>,

    /// Configuration directory (default `<prefix>/ssl`)
    pub openssldir: Option<String>,

    /// Library directory, relative to the prefix unless absolute
    pub libdir: Option<String>,

    /// Where descriptors are written (default: current directory)
    pub out_dir: Option<PathBuf>,

    /// Alternative feature/module/artifact catalog
    pub catalog: Option<PathBuf>,

    /// Options applied before the command-line options
    #[serde(default)]
    pub options: Vec<String>,
}

/// Parity checking configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParityConfig {
    /// Treat incomplete generation as a hard failure
    #[serde(default)]
    pub strict: bool,

    /// Additional reference files with `[[reference]]` tables
    #[serde(default)]
    pub references: Vec<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.configure.prefix.is_some() {
            self.configure.prefix = other.configure.prefix;
        }
        if other.configure.openssldir.is_some() {
            self.configure.openssldir = other.configure.openssldir;
        }
        if other.configure.libdir.is_some() {
            self.configure.libdir = other.configure.libdir;
        }
        if other.configure.out_dir.is_some() {
            self.configure.out_dir = other.configure.out_dir;
        }
        if other.configure.catalog.is_some() {
            self.configure.catalog = other.configure.catalog;
        }
        if !other.configure.options.is_empty() {
            self.configure.options = other.configure.options;
        }

        if other.parity.strict {
            self.parity.strict = true;
        }
        // References accumulate; a project never hides the user's references.
        self.parity.references.extend(other.parity.references);
    }

    /// Installation paths with config defaults applied.
    pub fn install_paths(&self) -> InstallPaths {
        let mut install = InstallPaths::default();
        if let Some(ref prefix) = self.configure.prefix {
            install.prefix = prefix.clone();
        }
        if self.configure.openssldir.is_some() {
            install.openssldir = self.configure.openssldir.clone();
        }
        if let Some(ref libdir) = self.configure.libdir {
            install.libdir = libdir.clone();
        }
        install
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.mooring/config.toml)
/// 2. Global config (~/.mooring/config.toml)
/// 3. Defaults
pub fn load_config(global_path: &Path, project_path: &Path) -> Config {
    let mut config = Config::default();

    if global_path.exists() {
        let global = Config::load_or_default(global_path);
        config.merge(global);
    }

    if project_path.exists() {
        let project = Config::load_or_default(project_path);
        config.merge(project);
    }

    config
}

/// Get the global mooring config directory (~/.mooring).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".mooring"))
}

/// Get the global config path (~/.mooring/config.toml).
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the project config path (.mooring/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".mooring").join("config.toml")
}
