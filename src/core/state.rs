//! The configuration being built, and its frozen form.
//!
//! [`ConfigurationState`] is mutable and only lives while options are being
//! applied. [`ConfigurationState::freeze`] derives the final flag and define
//! lists, checks the feature invariant and returns an immutable
//! [`Configuration`] that everything downstream reads.

use std::collections::{BTreeMap, BTreeSet};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigureError;
use crate::core::feature::{FeatureGraph, ToolchainHook};
use crate::core::platform::TargetPlatform;
use crate::resolver::ResolvedFeatures;
use crate::util::hash::Fingerprint;

/// Package identity from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: Version,
    /// API compatibility level used when `--api` is not given.
    pub api_version: Version,
    /// Prefix of generated macros, e.g. `OPENSSL` for `OPENSSL_NO_SSL3`.
    pub define_prefix: String,
    /// Include directories passed to every compile.
    #[serde(default)]
    pub include_dirs: Vec<String>,
}

/// Installation layout. Paths are target paths and are kept as strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallPaths {
    pub prefix: String,
    /// Defaults to `<prefix>/ssl`.
    pub openssldir: Option<String>,
    /// Relative to the prefix unless absolute.
    pub libdir: String,
    /// Opaque extra entries, passed through to the dump.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Default for InstallPaths {
    fn default() -> Self {
        InstallPaths {
            prefix: "/usr/local".to_string(),
            openssldir: None,
            libdir: "lib".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

fn join(base: &str, rest: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), rest)
}

impl InstallPaths {
    pub fn openssldir(&self) -> String {
        self.openssldir
            .clone()
            .unwrap_or_else(|| join(&self.prefix, "ssl"))
    }

    pub fn libdir_path(&self) -> String {
        if self.libdir.starts_with('/') {
            self.libdir.clone()
        } else {
            join(&self.prefix, &self.libdir)
        }
    }

    pub fn includedir(&self) -> String {
        join(&self.prefix, "include")
    }

    pub fn enginesdir(&self) -> String {
        join(&self.openssldir(), "engines")
    }

    pub fn modulesdir(&self) -> String {
        join(&self.openssldir(), "modules")
    }

    /// Every path, extras included. Standard keys win over extras.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.extra.clone();
        map.insert("prefix".to_string(), self.prefix.clone());
        map.insert("openssldir".to_string(), self.openssldir());
        map.insert("libdir".to_string(), self.libdir.clone());
        map.insert("includedir".to_string(), self.includedir());
        map.insert("enginesdir".to_string(), self.enginesdir());
        map.insert("modulesdir".to_string(), self.modulesdir());
        map
    }
}

/// Mutable configuration, filled in while options are applied.
#[derive(Debug, Clone)]
pub struct ConfigurationState {
    target: TargetPlatform,
    package: PackageInfo,
    install: InstallPaths,
    features: Option<ResolvedFeatures>,
    compiler_flags: Vec<String>,
    defines: Vec<String>,
    link_flags: Vec<String>,
    api_version: Option<Version>,
    tokens: Vec<String>,
}

impl ConfigurationState {
    pub fn new(target: TargetPlatform, package: PackageInfo, install: InstallPaths) -> Self {
        ConfigurationState {
            target,
            package,
            install,
            features: None,
            compiler_flags: Vec::new(),
            defines: Vec::new(),
            link_flags: Vec::new(),
            api_version: None,
            tokens: Vec::new(),
        }
    }

    pub fn target(&self) -> &TargetPlatform {
        &self.target
    }

    pub fn set_features(&mut self, features: ResolvedFeatures) {
        self.features = Some(features);
    }

    pub fn add_compiler_flag(&mut self, flag: impl Into<String>) {
        self.compiler_flags.push(flag.into());
    }

    pub fn add_define(&mut self, define: impl Into<String>) {
        self.defines.push(define.into());
    }

    pub fn add_link_flag(&mut self, flag: impl Into<String>) {
        self.link_flags.push(flag.into());
    }

    pub fn set_api_version(&mut self, version: Version) {
        self.api_version = Some(version);
    }

    /// The user tokens, recorded so the run can be reproduced.
    pub fn set_tokens(&mut self, tokens: Vec<String>) {
        self.tokens = tokens;
    }

    /// Derive the final flag lists and freeze.
    ///
    /// Ordering is fixed: toolchain flags, then feature hooks in feature
    /// name order, then user flags in the order given. Duplicates keep
    /// their first position.
    pub fn freeze(self, graph: &FeatureGraph) -> Result<Configuration, ConfigureError> {
        let features = self.features.ok_or_else(|| {
            ConfigureError::invalid_catalog("configuration frozen before feature resolution")
        })?;
        features.verify(graph)?;

        let tc = &self.target.toolchain;
        let prefix = &self.package.define_prefix;
        let hooks: BTreeSet<ToolchainHook> = graph
            .iter()
            .filter(|f| features.is_enabled(&f.name))
            .filter_map(|f| f.toolchain)
            .collect();

        let mut compiler_flags = tc.base_cflags.clone();
        let mut ex_libs = tc.ex_libs.clone();
        for hook in &hooks {
            match hook {
                ToolchainHook::Threads => {
                    compiler_flags.extend(tc.thread_cflags.iter().cloned());
                    ex_libs.extend(tc.thread_ex_libs.iter().cloned());
                }
                ToolchainHook::Pic => compiler_flags.extend(tc.pic_cflags.iter().cloned()),
            }
        }
        compiler_flags.extend(self.compiler_flags);
        ex_libs.extend(self.link_flags);

        let api_version = self
            .api_version
            .unwrap_or_else(|| self.package.api_version.clone());

        let mut defines = tc.platform_defines.clone();
        for flag in graph.iter() {
            if features.is_enabled(&flag.name) {
                defines.extend(flag.defines.iter().cloned());
            }
        }
        let api_level = api_level(&api_version).ok_or_else(|| ConfigureError::InvalidOption {
            token: format!("--api={}", api_version),
            reason: API_RANGE.to_string(),
        })?;
        defines.push(format!("{}_CONFIGURED_API={}", prefix, api_level));
        for flag in graph.iter() {
            if !features.is_enabled(&flag.name) {
                defines.push(flag.disabled_define(prefix));
            }
        }
        defines.push(format!("{}DIR=\"{}\"", prefix, self.install.openssldir()));
        defines.push(format!("ENGINESDIR=\"{}\"", self.install.enginesdir()));
        defines.push(format!("MODULESDIR=\"{}\"", self.install.modulesdir()));
        defines.extend(self.defines);

        let config = Configuration {
            enabled: features.enabled(),
            disabled: features.disabled(),
            features,
            target: self.target,
            package: self.package,
            install: self.install,
            compiler_flags: dedup(compiler_flags),
            defines: dedup(defines),
            ex_libs: dedup(ex_libs),
            api_version,
            api_level,
            tokens: self.tokens,
            fingerprint: String::new(),
        };
        let fingerprint = config.compute_fingerprint();
        Ok(Configuration {
            fingerprint,
            ..config
        })
    }
}

pub(crate) const API_RANGE: &str = "API levels are `x.y.z` with x < 1000 and y, z < 100";

/// Encode an API version as `x * 10000 + y * 100 + z`. Versions whose
/// parts do not fit that encoding have no level.
pub fn api_level(version: &Version) -> Option<u64> {
    if version.major >= 1000 || version.minor >= 100 || version.patch >= 100 {
        return None;
    }
    Some(version.major * 10000 + version.minor * 100 + version.patch)
}

fn dedup(items: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// A frozen, internally consistent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    target: TargetPlatform,
    package: PackageInfo,
    install: InstallPaths,
    features: ResolvedFeatures,
    enabled: BTreeSet<String>,
    disabled: BTreeSet<String>,
    compiler_flags: Vec<String>,
    defines: Vec<String>,
    ex_libs: Vec<String>,
    api_version: Version,
    api_level: u64,
    tokens: Vec<String>,
    fingerprint: String,
}

impl Configuration {
    pub fn target(&self) -> &TargetPlatform {
        &self.target
    }

    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    pub fn install(&self) -> &InstallPaths {
        &self.install
    }

    pub fn features(&self) -> &ResolvedFeatures {
        &self.features
    }

    pub fn is_enabled(&self, feature: &str) -> bool {
        self.enabled.contains(feature)
    }

    pub fn enabled_features(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    pub fn disabled_features(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    pub fn compiler_flags(&self) -> &[String] {
        &self.compiler_flags
    }

    pub fn defines(&self) -> &[String] {
        &self.defines
    }

    pub fn ex_libs(&self) -> &[String] {
        &self.ex_libs
    }

    pub fn api_version(&self) -> &Version {
        &self.api_version
    }

    /// The API version as `MMMNNPP`, e.g. `30000` for 3.0.0.
    pub fn api_level(&self) -> u64 {
        self.api_level
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Content hash over everything that affects generated output.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn compute_fingerprint(&self) -> String {
        let install = self.install.to_map();
        let mut fp = Fingerprint::new();
        fp.update_str(&self.package.name)
            .update_str(&self.package.version.to_string())
            .update_str(&self.api_version.to_string())
            .update_str(&self.target.canonical_id)
            .update_str(self.target.os_family.as_str())
            .update_str(&self.target.arch)
            .update_list("enabled", self.enabled.iter().map(String::as_str))
            .update_list("compiler_flags", self.compiler_flags.iter().map(String::as_str))
            .update_list("defines", self.defines.iter().map(String::as_str))
            .update_list("ex_libs", self.ex_libs.iter().map(String::as_str))
            .update_pairs(
                "install",
                install.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            );
        fp.finish_short()
    }
}
