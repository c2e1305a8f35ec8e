//! The configuration dump in its two encodings: `configdata.json` for new
//! tooling and a Perl `configdata.pm` for scripts written against the
//! legacy configure.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::builder::descriptor::archive_path;
use crate::builder::planner::ArtifactPlan;
use crate::builder::toolchain::Toolchain;
use crate::core::artifact::ArtifactStage;
use crate::core::module::{InstallDir, ModuleKind, ResolvedModule};
use crate::core::state::Configuration;

/// Name of the JSON dump in the output directory.
pub const JSON_DUMP: &str = "configdata.json";

/// One generated artifact as listed in the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub path: String,
    pub generator: String,
    pub stage: ArtifactStage,
    pub depends_on: Vec<String>,
}

/// One built module as listed in the dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleEntry {
    pub name: String,
    pub kind: ModuleKind,
    pub library: String,
    pub install: InstallDir,
    pub sources: Vec<String>,
    pub generated: Vec<String>,
}

/// Everything downstream tools read instead of parsing the makefile.
///
/// Fields are declared in key order so the JSON is sorted without a
/// separate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDump {
    pub api_version: String,
    pub arch: String,
    pub archiver: String,
    pub compiler: String,
    pub compiler_flags: Vec<String>,
    pub defines: Vec<String>,
    pub disabled_features: Vec<String>,
    pub dso_scheme: String,
    pub enabled_features: Vec<String>,
    pub ex_libs: Vec<String>,
    pub fingerprint: String,
    pub generated_artifacts: Vec<ManifestEntry>,
    pub install: BTreeMap<String, String>,
    pub modules: Vec<ModuleEntry>,
    pub os_family: String,
    pub package: String,
    pub shared_extension: String,
    pub target_id: String,
    pub version: String,
}

impl ConfigDump {
    pub fn new(
        config: &Configuration,
        plan: &ArtifactPlan,
        modules: &[ResolvedModule],
        toolchain: &dyn Toolchain,
    ) -> Self {
        let target = config.target();
        let tc = &target.toolchain;
        ConfigDump {
            api_version: config.api_version().to_string(),
            arch: target.arch.clone(),
            archiver: tc.archiver.clone(),
            compiler: tc.compiler.clone(),
            compiler_flags: config.compiler_flags().to_vec(),
            defines: config.defines().to_vec(),
            disabled_features: config.disabled_features().iter().cloned().collect(),
            dso_scheme: tc.dso_scheme.as_str().to_string(),
            enabled_features: config.enabled_features().iter().cloned().collect(),
            ex_libs: config.ex_libs().to_vec(),
            fingerprint: config.fingerprint().to_string(),
            generated_artifacts: plan
                .iter()
                .map(|a| ManifestEntry {
                    path: a.path.clone(),
                    generator: a.generator.kind().to_string(),
                    stage: a.stage(),
                    depends_on: a.depends_on.iter().cloned().collect(),
                })
                .collect(),
            install: config.install().to_map(),
            modules: modules
                .iter()
                .map(|m| ModuleEntry {
                    name: m.name.clone(),
                    kind: m.kind,
                    library: archive_path(toolchain, m),
                    install: m.install,
                    sources: m.sources.iter().cloned().collect(),
                    generated: m.required_headers.iter().cloned().collect(),
                })
                .collect(),
            os_family: target.os_family.as_str().to_string(),
            package: config.package().name.clone(),
            shared_extension: tc.shared_lib_extension.clone(),
            target_id: target.canonical_id.clone(),
            version: config.package().version.to_string(),
        }
    }

    /// Pretty JSON with a trailing newline.
    pub fn to_json(&self) -> Result<String> {
        let mut json =
            serde_json::to_string_pretty(self).context("failed to serialize configuration dump")?;
        json.push('\n');
        Ok(json)
    }
}

fn perl_str(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn perl_list<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let items: Vec<String> = items.into_iter().map(perl_str).collect();
    format!("[ {} ]", items.join(", "))
}

fn perl_hash(out: &mut String, name: &str, entries: &[(String, String)]) {
    let _ = writeln!(out, "our %{} = (", name);
    for (key, value) in entries {
        let _ = writeln!(out, "    {} => {},", perl_str(key), value);
    }
    out.push_str(");\n\n");
}

/// Render the legacy `configdata.pm`.
pub fn render_perl(dump: &ConfigDump, config: &Configuration) -> String {
    let mut out = String::new();
    out.push_str("#! /usr/bin/env perl\n");
    out.push_str("# Generated by mooring. Do not edit.\n\n");
    out.push_str("package configdata;\n\n");
    out.push_str("use strict;\nuse warnings;\n\n");
    out.push_str("use Exporter;\n");
    out.push_str("our @ISA = qw(Exporter);\n");
    out.push_str("our @EXPORT = qw(%config %target %disabled @enabled %defines);\n\n");

    let mut cfg: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in &dump.install {
        cfg.insert(key.clone(), perl_str(value));
    }
    cfg.insert("api".to_string(), perl_str(&config.api_level().to_string()));
    cfg.insert("api_version".to_string(), perl_str(&dump.api_version));
    cfg.insert("fingerprint".to_string(), perl_str(&dump.fingerprint));
    cfg.insert("options".to_string(), perl_str(&config.tokens().join(" ")));
    cfg.insert("target".to_string(), perl_str(&dump.target_id));
    cfg.insert("version".to_string(), perl_str(&dump.version));
    cfg.insert(
        "major".to_string(),
        perl_str(&config.package().version.major.to_string()),
    );
    cfg.insert(
        "minor".to_string(),
        perl_str(&config.package().version.minor.to_string()),
    );
    cfg.insert(
        "patch".to_string(),
        perl_str(&config.package().version.patch.to_string()),
    );
    perl_hash(&mut out, "config", &cfg.into_iter().collect::<Vec<_>>());

    let tc = &config.target().toolchain;
    let target = vec![
        ("AR".to_string(), perl_str(&tc.archiver)),
        ("CC".to_string(), perl_str(&tc.compiler)),
        (
            "cflags".to_string(),
            perl_list(dump.compiler_flags.iter().map(String::as_str)),
        ),
        ("dso_scheme".to_string(), perl_str(&dump.dso_scheme)),
        (
            "ex_libs".to_string(),
            perl_list(dump.ex_libs.iter().map(String::as_str)),
        ),
        ("lib_extension".to_string(), perl_str(&tc.static_lib_extension)),
        ("obj_extension".to_string(), perl_str(&tc.object_extension)),
        ("shared_extension".to_string(), perl_str(&dump.shared_extension)),
        ("sys_id".to_string(), perl_str(&dump.os_family)),
        ("thread_scheme".to_string(), perl_str(thread_scheme(config))),
    ];
    perl_hash(&mut out, "target", &target);

    let disabled: Vec<(String, String)> = config
        .features()
        .iter()
        .filter(|(_, state)| !state.enabled)
        .map(|(name, state)| (name.to_string(), perl_str(state.origin.legacy_label())))
        .collect();
    perl_hash(&mut out, "disabled", &disabled);

    let _ = writeln!(
        out,
        "our @enabled = (\n{});\n",
        dump.enabled_features
            .iter()
            .map(|f| format!("    {},\n", perl_str(f)))
            .collect::<String>()
    );

    let defines: Vec<(String, String)> = dump
        .defines
        .iter()
        .map(|d| match d.split_once('=') {
            Some((name, value)) => (name.to_string(), perl_str(value)),
            None => (d.clone(), "undef".to_string()),
        })
        .collect();
    perl_hash(&mut out, "defines", &defines);

    out.push_str("1;\n");
    out
}

fn thread_scheme(config: &Configuration) -> &'static str {
    if !config.is_enabled("threads") {
        "(unknown)"
    } else if config.target().is_windows() {
        "winthreads"
    } else {
        "pthreads"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perl_string_escaping() {
        assert_eq!(perl_str("plain"), "'plain'");
        assert_eq!(perl_str("it's"), "'it\\'s'");
        assert_eq!(perl_str("C:\\ssl"), "'C:\\\\ssl'");
    }

    #[test]
    fn test_perl_list() {
        assert_eq!(perl_list(["-O3", "-Wall"]), "[ '-O3', '-Wall' ]");
        assert_eq!(perl_list(Vec::<&str>::new()), "[  ]");
    }

    #[test]
    fn test_perl_hash_layout() {
        let mut out = String::new();
        perl_hash(
            &mut out,
            "disabled",
            &[("fips".to_string(), perl_str("default"))],
        );
        assert_eq!(out, "our %disabled = (\n    'fips' => 'default',\n);\n\n");
    }
}
