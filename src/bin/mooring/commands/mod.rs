//! Command implementations

pub mod completions;
pub mod configure;
pub mod features;
pub mod matrix;
pub mod plan;
pub mod targets;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::cli::TargetArgs;
use mooring::builder::parity::{load_references, ParityReference};
use mooring::core::Catalog;
use mooring::ops::ConfigureOptions;
use mooring::util::config::{global_config_path, load_config, project_config_path};
use mooring::util::Config;

/// Config files plus the catalog they point at.
pub struct Session {
    pub cwd: PathBuf,
    pub config: Config,
    pub catalog: Catalog,
}

impl Session {
    /// Load config from `~/.mooring` and `./.mooring`, then the catalog.
    ///
    /// `--catalog` beats the configured catalog, which beats the built-in one.
    pub fn load(catalog_flag: Option<PathBuf>) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        let config = load_session_config(&cwd);

        let catalog = match catalog_flag.or_else(|| config.configure.catalog.clone()) {
            Some(path) => Catalog::load(&cwd.join(path))?,
            None => Catalog::builtin()?,
        };
        tracing::debug!("using catalog {}", catalog.origin());

        Ok(Session {
            cwd,
            config,
            catalog,
        })
    }

    /// Configure options for `args`, with config defaults underneath.
    pub fn configure_options(&self, args: &TargetArgs) -> Result<ConfigureOptions> {
        let mut tokens = self.config.configure.options.clone();
        tokens.extend(args.options.iter().cloned());
        let mut opts = ConfigureOptions::for_host(tokens);

        if let Some(ref os) = args.os {
            opts.os = os.clone();
        }
        if let Some(ref arch) = args.arch {
            opts.arch = arch.clone();
        }
        opts.target = args.target.clone();

        opts.install = self.config.install_paths();
        if let Some(ref prefix) = args.prefix {
            opts.install.prefix = prefix.clone();
        }
        if args.openssldir.is_some() {
            opts.install.openssldir = args.openssldir.clone();
        }
        if let Some(ref libdir) = args.libdir {
            opts.install.libdir = libdir.clone();
        }
        for entry in &args.set {
            let (key, value) = parse_key_value(entry)?;
            opts.install.extra.insert(key, value);
        }

        if let Some(ref out_dir) = self.config.configure.out_dir {
            opts.out_dir = self.cwd.join(out_dir);
        }
        opts.strict_parity = self.config.parity.strict;
        opts.extra_references = self.references(&[])?;

        Ok(opts)
    }

    /// Parity references from config followed by `extra`.
    pub fn references(&self, extra: &[PathBuf]) -> Result<Vec<ParityReference>> {
        let mut references = Vec::new();
        for path in self.config.parity.references.iter().chain(extra) {
            references.extend(load_references(&self.cwd.join(path))?);
        }
        Ok(references)
    }
}

fn load_session_config(cwd: &Path) -> Config {
    let project = project_config_path(cwd);
    match global_config_path() {
        Some(global) => load_config(&global, &project),
        None => Config::load_or_default(&project),
    }
}

/// Split `KEY=VALUE`.
pub fn parse_key_value(entry: &str) -> Result<(String, String)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => bail!("invalid `--set {}`, expected KEY=VALUE", entry),
    }
}
