//! End-to-end tests for the configure pipeline through the library API.

use std::collections::BTreeSet;
use std::fs;

use mooring::builder::dump::JSON_DUMP;
use mooring::builder::{BuildDescriptorEmitter, GeneratedArtifactPlanner};
use mooring::ops::{configure, plan_configuration, resolve_configuration, ConfigureOptions};
use mooring::DecisionLog;
use mooring::{Catalog, ConfigureError};
use tempfile::TempDir;

const CATALOG: &str = include_str!("../data/openssl.toml");

fn options(os: &str, arch: &str, tokens: &[&str], out: &TempDir) -> ConfigureOptions {
    let mut opts = ConfigureOptions::for_host(tokens.iter().map(|t| t.to_string()).collect());
    opts.os = os.to_string();
    opts.arch = arch.to_string();
    opts.out_dir = out.path().to_path_buf();
    opts
}

fn configure_err(catalog: &Catalog, opts: &ConfigureOptions) -> ConfigureError {
    let err = configure(catalog, opts).unwrap_err();
    err.downcast_ref::<ConfigureError>()
        .cloned()
        .unwrap_or_else(|| panic!("expected a ConfigureError, got {:#}", err))
}

fn dir_is_empty(dir: &TempDir) -> bool {
    fs::read_dir(dir.path()).unwrap().next().is_none()
}

// ============================================================================
// Platform and default features
// ============================================================================

#[test]
fn test_linux_defaults() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let result = configure(&catalog, &options("linux", "x86_64", &[], &tmp)).unwrap();

    let dump: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(tmp.path().join(JSON_DUMP)).unwrap()).unwrap();
    assert_eq!(dump["target_id"], "linux-x86_64");

    let enabled: BTreeSet<String> = dump["enabled_features"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(&enabled, result.configuration.enabled_features());
    for feature in ["asm", "avx2", "threads", "tls1_3", "module"] {
        assert!(enabled.contains(feature), "{} should be on by default", feature);
    }
    for feature in ["fips", "legacy", "neon", "ssl3"] {
        assert!(!enabled.contains(feature), "{} should be off by default", feature);
    }
}

#[test]
fn test_exclusion_with_explicit_disable() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let result = configure(
        &catalog,
        &options("linux", "x86_64", &["no-legacy", "enable-fips"], &tmp),
    )
    .unwrap();

    let config = &result.configuration;
    assert!(config.is_enabled("fips"));
    assert!(!config.is_enabled("legacy"));
    assert!(result.modules.iter().any(|m| m.name == "fips"));
    assert!(!result.modules.iter().any(|m| m.name == "legacy"));
}

#[test]
fn test_conflicting_overrides_fail() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let err = configure_err(
        &catalog,
        &options("linux", "x86_64", &["enable-legacy", "enable-fips"], &tmp),
    );

    match err {
        ConfigureError::ConflictingFeatureRequirement { feature, other, .. } => {
            let pair: BTreeSet<String> = [feature, other].into_iter().collect();
            assert_eq!(
                pair,
                ["fips".to_string(), "legacy".to_string()].into_iter().collect()
            );
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(dir_is_empty(&tmp));
}

#[test]
fn test_unknown_arch_falls_back_with_warning() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let result = configure(&catalog, &options("linux", "riscv128", &[], &tmp)).unwrap();

    let target = result.configuration.target();
    assert_eq!(target.canonical_id, "generic-riscv128");
    assert!(target.fallback);
    assert!(result
        .log
        .warnings()
        .any(|w| w.message.contains("riscv128")));
}

#[test]
fn test_unknown_os_is_fatal() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let err = configure_err(&catalog, &options("unknownos", "x86_64", &[], &tmp));

    assert!(matches!(err, ConfigureError::UnsupportedPlatform { .. }));
    assert!(dir_is_empty(&tmp));
}

// ============================================================================
// Artifact planning
// ============================================================================

#[test]
fn test_artifact_cycle_writes_nothing() {
    let cyclic = CATALOG
        .replace(
            "template = \"crypto/buildinf.h.in\" }\ndepends_on = [\"configdata.pm\"]",
            "template = \"crypto/buildinf.h.in\" }\ndepends_on = [\"configdata.pm\", \"include/crypto/bn_conf.h\"]",
        )
        .replace(
            "template = \"include/crypto/bn_conf.h.in\" }\ndepends_on = [\"configdata.pm\"]",
            "template = \"include/crypto/bn_conf.h.in\" }\ndepends_on = [\"configdata.pm\", \"crypto/buildinf.h\"]",
        );
    assert_ne!(cyclic, CATALOG);

    let catalog = Catalog::from_toml_str(&cyclic, "cyclic.toml").unwrap();
    let tmp = TempDir::new().unwrap();
    let err = configure_err(&catalog, &options("linux", "x86_64", &[], &tmp));

    match err {
        ConfigureError::CircularArtifactDependency { artifacts } => {
            let cycle: BTreeSet<&str> = artifacts.iter().map(String::as_str).collect();
            assert_eq!(
                cycle,
                ["crypto/buildinf.h", "include/crypto/bn_conf.h"]
                    .into_iter()
                    .collect()
            );
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(dir_is_empty(&tmp));
}

#[test]
fn test_unknown_required_header_writes_nothing() {
    let broken = CATALOG.replace(
        "required_generated = [\"include/openssl/configuration.h\"]\nsources = [\"providers/nullprov.c\"]",
        "required_generated = [\"include/openssl/configuration.h\", \"include/openssl/nullprov.h\"]\nsources = [\"providers/nullprov.c\"]",
    );
    assert_ne!(broken, CATALOG);

    let catalog = Catalog::from_toml_str(&broken, "broken.toml").unwrap();
    let tmp = TempDir::new().unwrap();
    let err = configure_err(&catalog, &options("linux", "x86_64", &[], &tmp));

    match err {
        ConfigureError::UnresolvedArtifactDependency {
            required_by,
            missing,
        } => {
            assert_eq!(missing, "include/openssl/nullprov.h");
            assert!(required_by.contains("null"), "{}", required_by);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(dir_is_empty(&tmp));
}

#[test]
fn test_emitter_refuses_plan_without_module_headers() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let opts = options("linux", "x86_64", &[], &tmp);
    let mut log = DecisionLog::new();

    let config = resolve_configuration(&catalog, &opts, &mut log).unwrap();
    let (modules, _) = plan_configuration(&catalog, &config, &mut log).unwrap();
    assert!(modules.iter().any(|m| !m.required_headers.is_empty()));

    let dumps_only = GeneratedArtifactPlanner::new(catalog.artifacts())
        .plan(&[], &mut log)
        .unwrap();
    let err = BuildDescriptorEmitter::new()
        .build(&config, &dumps_only, &modules)
        .unwrap_err();
    assert!(matches!(err, ConfigureError::InconsistentPlan { .. }), "{}", err);
    assert!(dir_is_empty(&tmp));
}

#[test]
fn test_generation_precedes_compilation() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let result = configure(&catalog, &options("linux", "x86_64", &["enable-fips"], &tmp)).unwrap();

    let makefile = fs::read_to_string(tmp.path().join("Makefile")).unwrap();
    let generated = makefile.find("build_generated:").unwrap();
    let modules = makefile.find("build_modules:").unwrap();
    assert!(generated < modules);

    for module in &result.modules {
        for header in &module.required_headers {
            assert!(result.plan.contains(header), "{} not planned", header);
        }
    }
}

// ============================================================================
// Parity
// ============================================================================

#[test]
fn test_extra_features_pass_strict_parity() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let tokens = [
        "enable-ktls",
        "enable-sctp",
        "enable-trace",
        "enable-weak-ssl-ciphers",
        "enable-ssl3-method",
        "enable-asan",
    ];
    let mut opts = options("linux", "x86_64", &tokens, &tmp);
    opts.strict_parity = true;

    let result = configure(&catalog, &opts).unwrap();
    assert!(result.parity.is_complete(), "{:?}", result.parity.warnings);
    let reference = result.parity.reference.unwrap();
    assert!(reference.min_disabled_features < 15);
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_reruns_are_byte_identical() {
    let catalog = Catalog::builtin().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    let tokens = ["no-asm", "enable-trace", "-DPEDANTIC"];

    let a = configure(&catalog, &options("linux", "aarch64", &tokens, &first)).unwrap();
    let b = configure(&catalog, &options("linux", "aarch64", &tokens, &second)).unwrap();

    assert_eq!(a.configuration.fingerprint(), b.configuration.fingerprint());
    for name in ["Makefile", "configdata.json", "configdata.pm"] {
        assert_eq!(
            fs::read(first.path().join(name)).unwrap(),
            fs::read(second.path().join(name)).unwrap(),
            "{} differs between runs",
            name
        );
    }
}

#[test]
fn test_option_changes_change_fingerprint() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let mut plain = options("linux", "x86_64", &[], &tmp);
    plain.dry_run = true;
    let mut no_threads = options("linux", "x86_64", &["no-threads"], &tmp);
    no_threads.dry_run = true;

    let a = configure(&catalog, &plain).unwrap();
    let b = configure(&catalog, &no_threads).unwrap();
    assert_ne!(a.configuration.fingerprint(), b.configuration.fingerprint());
}

#[test]
fn test_windows_uses_msvc_commands() {
    let catalog = Catalog::builtin().unwrap();
    let tmp = TempDir::new().unwrap();
    let mut opts = options("windows", "x86_64", &[], &tmp);
    opts.dry_run = true;
    let result = configure(&catalog, &opts).unwrap();

    assert_eq!(result.configuration.target().canonical_id, "VC-WIN64A");
    let makefile = result.descriptor.makefile();
    assert!(makefile.contains("/OUT:"));
    assert!(!makefile.contains(" -c "));
}
