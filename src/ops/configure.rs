//! The configure pipeline.
//!
//! platform -> options -> features -> modules -> artifacts -> descriptor
//! -> parity. Every stage runs to completion before the next one starts,
//! and nothing touches the output directory until the descriptor has been
//! built in full.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::builder::descriptor::{BuildDescriptor, BuildDescriptorEmitter};
use crate::builder::dump::JSON_DUMP;
use crate::builder::parity::{DumpMeasurement, ParityReference, ParityReport, ParityValidator};
use crate::builder::planner::{ArtifactPlan, GeneratedArtifactPlanner};
use crate::core::catalog::Catalog;
use crate::core::errors::ConfigureError;
use crate::core::module::ResolvedModule;
use crate::core::platform::PlatformResolver;
use crate::core::state::{Configuration, ConfigurationState, InstallPaths};
use crate::resolver::{parse_tokens, FeatureResolver};
use crate::util::log::{DecisionLog, Stage};

/// Options for one configure run.
#[derive(Debug, Clone)]
pub struct ConfigureOptions {
    pub os: String,
    pub arch: String,
    /// Canonical target id overriding the os/arch lookup
    pub target: Option<String>,
    /// Option tokens, applied left to right
    pub tokens: Vec<String>,
    pub install: InstallPaths,
    pub out_dir: PathBuf,
    /// Build everything but write nothing
    pub dry_run: bool,
    /// Treat parity warnings as a failure
    pub strict_parity: bool,
    /// References checked on top of the catalog's own
    pub extra_references: Vec<ParityReference>,
}

impl ConfigureOptions {
    /// Options for the machine this runs on.
    pub fn for_host(tokens: Vec<String>) -> Self {
        let (os, arch) = PlatformResolver::host();
        ConfigureOptions {
            os,
            arch,
            target: None,
            tokens,
            install: InstallPaths::default(),
            out_dir: PathBuf::from("."),
            dry_run: false,
            strict_parity: false,
            extra_references: Vec::new(),
        }
    }
}

/// Everything a configure run produced.
#[derive(Debug)]
pub struct ConfigureResult {
    pub configuration: Configuration,
    pub modules: Vec<ResolvedModule>,
    pub plan: ArtifactPlan,
    pub descriptor: BuildDescriptor,
    /// Files written, empty on a dry run
    pub written: Vec<PathBuf>,
    pub parity: ParityReport,
    pub log: DecisionLog,
}

/// Resolve platform, options and features into a frozen configuration.
pub fn resolve_configuration(
    catalog: &Catalog,
    opts: &ConfigureOptions,
    log: &mut DecisionLog,
) -> Result<Configuration, ConfigureError> {
    let platform = PlatformResolver::new().resolve(&opts.os, &opts.arch, opts.target.as_deref(), log)?;
    log.note(Stage::Platform, format!("target {}", platform));

    let parsed = parse_tokens(&opts.tokens, catalog.features())?;
    for define in &parsed.defines {
        log.note(Stage::Options, format!("user define {}", define));
    }
    for flag in parsed.compiler_flags.iter().chain(&parsed.link_flags) {
        log.note(Stage::Options, format!("user flag {}", flag));
    }

    let features = FeatureResolver::new(catalog.features(), &platform).resolve(&parsed.overrides, log)?;

    let mut state = ConfigurationState::new(platform, catalog.package().clone(), opts.install.clone());
    state.set_features(features);
    for flag in parsed.compiler_flags {
        state.add_compiler_flag(flag);
    }
    for define in parsed.defines {
        state.add_define(define);
    }
    for flag in parsed.link_flags {
        state.add_link_flag(flag);
    }
    if let Some(api) = parsed.api_version {
        log.note(Stage::Options, format!("API level {}", api));
        state.set_api_version(api);
    }
    state.set_tokens(parsed.tokens);

    state.freeze(catalog.features())
}

/// Work out which modules build, in what order, and what has to be
/// generated first.
pub fn plan_configuration(
    catalog: &Catalog,
    config: &Configuration,
    log: &mut DecisionLog,
) -> Result<(Vec<ResolvedModule>, ArtifactPlan), ConfigureError> {
    let enabled = catalog.modules().modules_enabled_for(config, log);
    let modules = catalog.modules().build_order(&enabled, log)?;
    let plan = GeneratedArtifactPlanner::new(catalog.artifacts()).plan(&modules, log)?;
    Ok((modules, plan))
}

/// Run the whole pipeline.
///
/// A [`ConfigureError`] from any stage is returned as is, so callers can
/// downcast it for a diagnostic. The output directory is untouched unless
/// every stage up to emission succeeded.
pub fn configure(catalog: &Catalog, opts: &ConfigureOptions) -> Result<ConfigureResult> {
    let mut log = DecisionLog::new();

    let configuration = resolve_configuration(catalog, opts, &mut log)?;
    let (modules, plan) = plan_configuration(catalog, &configuration, &mut log)?;
    let descriptor = BuildDescriptorEmitter::new().build(&configuration, &plan, &modules)?;
    log.note(
        Stage::Emit,
        format!(
            "{} rules, {} files",
            descriptor.rules().len(),
            descriptor.files().len()
        ),
    );

    let mut validator = ParityValidator::new(catalog.references().to_vec());
    validator.add_references(opts.extra_references.iter().cloned());
    validator.set_defaults(
        configuration.target().canonical_id.clone(),
        catalog.features().defaults_for(configuration.target()),
    );

    let (written, parity) = if opts.dry_run {
        log.note(Stage::Emit, "dry run, nothing written");
        let json = descriptor.file(JSON_DUMP).unwrap_or_default();
        (Vec::new(), validator.check(DumpMeasurement::from_json(json)?))
    } else {
        let written = descriptor
            .write_to(&opts.out_dir)
            .with_context(|| format!("failed to write to {}", opts.out_dir.display()))?;
        let report = validator.validate_file(&opts.out_dir.join(JSON_DUMP))?;
        (written, report)
    };

    for warning in &parity.warnings {
        log.warn(Stage::Parity, warning.to_string());
    }
    if opts.strict_parity && !parity.is_complete() {
        return Err(ConfigureError::IncompleteGeneration {
            target: configuration.target().canonical_id.clone(),
            details: parity.warnings.iter().map(|w| w.to_string()).collect(),
        }
        .into());
    }

    tracing::info!(
        "configured {} ({} enabled, {} disabled features)",
        configuration.target().canonical_id,
        configuration.enabled_features().len(),
        configuration.disabled_features().len()
    );

    Ok(ConfigureResult {
        configuration,
        modules,
        plan,
        descriptor,
        written,
        parity,
        log,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(os: &str, arch: &str, tokens: &[&str], out: &TempDir) -> ConfigureOptions {
        ConfigureOptions {
            os: os.to_string(),
            arch: arch.to_string(),
            target: None,
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            install: InstallPaths::default(),
            out_dir: out.path().to_path_buf(),
            dry_run: false,
            strict_parity: false,
            extra_references: Vec::new(),
        }
    }

    #[test]
    fn test_configure_writes_descriptor() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let result = configure(&catalog, &options("linux", "x86_64", &[], &tmp)).unwrap();

        assert_eq!(result.configuration.target().canonical_id, "linux-x86_64");
        assert!(tmp.path().join("Makefile").exists());
        assert!(tmp.path().join("configdata.json").exists());
        assert!(tmp.path().join("configdata.pm").exists());
        assert_eq!(result.written.len(), 3);
        assert!(result.parity.is_complete(), "{:?}", result.parity.warnings);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let mut opts = options("linux", "x86_64", &[], &tmp);
        opts.dry_run = true;
        let result = configure(&catalog, &opts).unwrap();

        assert!(result.written.is_empty());
        assert!(result.parity.reference.is_some());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_strict_parity_fails_on_truncated_output() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let mut opts = options("linux", "x86_64", &[], &tmp);
        opts.strict_parity = true;
        opts.extra_references.push(ParityReference {
            target: "linux-x86_64".to_string(),
            enabled_features: None,
            min_dump_bytes: u64::MAX,
            min_dump_keys: 0,
            min_disabled_features: 0,
        });

        let err = configure(&catalog, &opts).unwrap_err();
        let err = err.downcast_ref::<ConfigureError>().unwrap();
        assert!(matches!(err, ConfigureError::IncompleteGeneration { .. }));
    }

    #[test]
    fn test_errors_stay_typed() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let err = configure(&catalog, &options("plan9", "x86_64", &[], &tmp)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigureError>(),
            Some(ConfigureError::UnsupportedPlatform { .. })
        ));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_plan_orders_modules_and_artifacts() {
        let catalog = Catalog::builtin().unwrap();
        let tmp = TempDir::new().unwrap();
        let mut log = DecisionLog::new();
        let config =
            resolve_configuration(&catalog, &options("linux", "x86_64", &["enable-fips"], &tmp), &mut log)
                .unwrap();
        let (modules, plan) = plan_configuration(&catalog, &config, &mut log).unwrap();

        let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("crypto") < pos("ssl"));
        assert!(pos("base") < pos("fips"));
        assert_eq!(plan.paths()[0], "configdata.pm");
        assert!(plan.contains("providers/fips.ld"));
    }
}
