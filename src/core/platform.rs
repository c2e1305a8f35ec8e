//! Platform resolution.
//!
//! Maps a host or cross-compilation target, described as an OS family and a
//! CPU architecture, to one canonical target id and the toolchain defaults
//! that go with it. The table is closed: anything outside it either falls
//! back to `generic-<arch>` (known OS, unknown arch) or is rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigureError;
use crate::util::log::{DecisionLog, Stage};

/// Operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Linux,
    Darwin,
    Bsd,
    Windows,
    Android,
    Ios,
}

impl OsFamily {
    pub const ALL: [OsFamily; 6] = [
        OsFamily::Linux,
        OsFamily::Darwin,
        OsFamily::Bsd,
        OsFamily::Windows,
        OsFamily::Android,
        OsFamily::Ios,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Linux => "linux",
            OsFamily::Darwin => "darwin",
            OsFamily::Bsd => "bsd",
            OsFamily::Windows => "windows",
            OsFamily::Android => "android",
            OsFamily::Ios => "ios",
        }
    }

    /// Parse an OS name, accepting the usual aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "linux" => Some(OsFamily::Linux),
            "darwin" | "macos" | "macosx" | "osx" => Some(OsFamily::Darwin),
            "bsd" | "freebsd" | "openbsd" | "netbsd" | "dragonfly" => Some(OsFamily::Bsd),
            "windows" | "win32" | "win64" => Some(OsFamily::Windows),
            "android" => Some(OsFamily::Android),
            "ios" => Some(OsFamily::Ios),
            _ => None,
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OsFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OsFamily::parse(s).ok_or_else(|| format!("unknown OS family `{}`", s))
    }
}

/// Normalize an architecture name: trim, lowercase, resolve aliases.
pub fn normalize_arch(raw: &str) -> String {
    let arch = raw.trim().to_ascii_lowercase();
    let canonical = match arch.as_str() {
        "amd64" | "x64" | "x86-64" => "x86_64",
        "i386" | "i486" | "i586" | "i686" | "x86" | "ia32" => "x86",
        "arm64" | "armv8" | "aarch64_be" => "aarch64",
        "arm" | "armv7l" | "armv7a" | "armhf" => "armv7",
        "powerpc64le" | "ppc64el" => "ppc64le",
        _ => return arch,
    };
    canonical.to_string()
}

/// How the generated descriptor spells commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStyle {
    Gnu,
    Msvc,
}

/// Dynamic loading scheme baked into the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DsoScheme {
    Dlfcn,
    Win32,
}

impl DsoScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsoScheme::Dlfcn => "dlfcn",
            DsoScheme::Win32 => "win32",
        }
    }
}

/// Compiler, archiver and flag defaults for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolchainDefaults {
    pub compiler: String,
    pub archiver: String,
    pub style: CommandStyle,
    pub dso_scheme: DsoScheme,
    pub object_extension: String,
    pub static_lib_prefix: String,
    pub static_lib_extension: String,
    pub shared_lib_extension: String,
    pub base_cflags: Vec<String>,
    /// Added when a feature hooks thread support.
    pub thread_cflags: Vec<String>,
    pub thread_ex_libs: Vec<String>,
    /// Added when a feature hooks position-independent code.
    pub pic_cflags: Vec<String>,
    pub ex_libs: Vec<String>,
    pub platform_defines: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn endian_define(arch: &str) -> Vec<String> {
    match arch {
        "x86_64" | "x86" | "aarch64" | "armv7" | "ppc64le" | "riscv64" => strings(&["L_ENDIAN"]),
        "mips" | "mips64" | "s390x" => strings(&["B_ENDIAN"]),
        _ => Vec::new(),
    }
}

impl ToolchainDefaults {
    /// Defaults for an OS family and normalized architecture.
    pub fn for_platform(os: OsFamily, arch: &str) -> Self {
        let unix = |compiler: &str, archiver: &str, shared: &str| ToolchainDefaults {
            compiler: compiler.to_string(),
            archiver: archiver.to_string(),
            style: CommandStyle::Gnu,
            dso_scheme: DsoScheme::Dlfcn,
            object_extension: ".o".to_string(),
            static_lib_prefix: "lib".to_string(),
            static_lib_extension: ".a".to_string(),
            shared_lib_extension: shared.to_string(),
            base_cflags: strings(&["-O3", "-Wall"]),
            thread_cflags: strings(&["-pthread"]),
            thread_ex_libs: strings(&["-pthread"]),
            pic_cflags: strings(&["-fPIC"]),
            ex_libs: Vec::new(),
            platform_defines: endian_define(arch),
        };

        match os {
            OsFamily::Linux => {
                let mut tc = unix("gcc", "ar", ".so");
                tc.ex_libs = strings(&["-ldl"]);
                tc
            }
            OsFamily::Bsd => unix("cc", "ar", ".so"),
            OsFamily::Darwin => {
                let mut tc = unix("cc", "ar", ".dylib");
                tc.thread_cflags = strings(&["-D_REENTRANT"]);
                tc.thread_ex_libs = Vec::new();
                // Darwin code is position independent by default.
                tc.pic_cflags = Vec::new();
                tc
            }
            OsFamily::Ios => {
                let mut tc = unix("clang", "ar", ".dylib");
                tc.base_cflags.push("-fno-common".to_string());
                tc.thread_cflags = strings(&["-D_REENTRANT"]);
                tc.thread_ex_libs = Vec::new();
                tc.pic_cflags = Vec::new();
                tc
            }
            OsFamily::Android => {
                let mut tc = unix("clang", "llvm-ar", ".so");
                // Bionic has pthreads in libc.
                tc.thread_ex_libs = Vec::new();
                tc.ex_libs = strings(&["-ldl"]);
                tc
            }
            OsFamily::Windows => {
                let mut defines = endian_define(arch);
                defines.extend(strings(&[
                    "OPENSSL_SYS_WIN32",
                    "WIN32_LEAN_AND_MEAN",
                    "UNICODE",
                    "_UNICODE",
                ]));
                ToolchainDefaults {
                    compiler: "cl".to_string(),
                    archiver: "lib".to_string(),
                    style: CommandStyle::Msvc,
                    dso_scheme: DsoScheme::Win32,
                    object_extension: ".obj".to_string(),
                    static_lib_prefix: "lib".to_string(),
                    static_lib_extension: ".lib".to_string(),
                    shared_lib_extension: ".dll".to_string(),
                    base_cflags: strings(&["/nologo", "/W3", "/O2", "/Gs0", "/GF", "/Gy"]),
                    thread_cflags: strings(&["/MD"]),
                    thread_ex_libs: Vec::new(),
                    pic_cflags: Vec::new(),
                    ex_libs: strings(&[
                        "ws2_32.lib",
                        "gdi32.lib",
                        "advapi32.lib",
                        "crypt32.lib",
                        "user32.lib",
                    ]),
                    platform_defines: defines,
                }
            }
        }
    }
}

/// One row of the canonical target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetEntry {
    pub os: OsFamily,
    pub arch: &'static str,
    pub id: &'static str,
}

const fn entry(os: OsFamily, arch: &'static str, id: &'static str) -> TargetEntry {
    TargetEntry { os, arch, id }
}

/// Canonical target table.
pub const TARGETS: &[TargetEntry] = &[
    entry(OsFamily::Linux, "x86_64", "linux-x86_64"),
    entry(OsFamily::Linux, "x86", "linux-x86"),
    entry(OsFamily::Linux, "aarch64", "linux-aarch64"),
    entry(OsFamily::Linux, "armv7", "linux-armv4"),
    entry(OsFamily::Linux, "mips", "linux-mips32"),
    entry(OsFamily::Linux, "mips64", "linux-mips64"),
    entry(OsFamily::Linux, "ppc64le", "linux-ppc64le"),
    entry(OsFamily::Linux, "s390x", "linux64-s390x"),
    entry(OsFamily::Linux, "riscv64", "linux64-riscv64"),
    entry(OsFamily::Darwin, "x86_64", "darwin64-x86_64-cc"),
    entry(OsFamily::Darwin, "aarch64", "darwin64-arm64-cc"),
    entry(OsFamily::Bsd, "x86_64", "BSD-x86_64"),
    entry(OsFamily::Bsd, "x86", "BSD-x86"),
    entry(OsFamily::Bsd, "aarch64", "BSD-aarch64"),
    entry(OsFamily::Windows, "x86_64", "VC-WIN64A"),
    entry(OsFamily::Windows, "x86", "VC-WIN32"),
    entry(OsFamily::Windows, "aarch64", "VC-WIN-ARM64"),
    entry(OsFamily::Android, "x86_64", "android-x86_64"),
    entry(OsFamily::Android, "x86", "android-x86"),
    entry(OsFamily::Android, "aarch64", "android-arm64"),
    entry(OsFamily::Android, "armv7", "android-arm"),
    entry(OsFamily::Ios, "aarch64", "ios64-cross"),
];

const GENERIC_PREFIX: &str = "generic-";

/// A resolved target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetPlatform {
    pub os_family: OsFamily,
    pub arch: String,
    pub canonical_id: String,
    pub toolchain: ToolchainDefaults,
    /// True when no table entry matched and `generic-<arch>` was used.
    pub fallback: bool,
}

impl TargetPlatform {
    fn new(os_family: OsFamily, arch: String, canonical_id: String, fallback: bool) -> Self {
        let toolchain = ToolchainDefaults::for_platform(os_family, &arch);
        TargetPlatform {
            os_family,
            arch,
            canonical_id,
            toolchain,
            fallback,
        }
    }

    pub fn is_windows(&self) -> bool {
        self.os_family == OsFamily::Windows
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_id)
    }
}

/// Maps (os, arch) pairs to canonical targets.
#[derive(Debug, Clone, Copy)]
pub struct PlatformResolver {
    table: &'static [TargetEntry],
}

impl Default for PlatformResolver {
    fn default() -> Self {
        PlatformResolver { table: TARGETS }
    }
}

impl PlatformResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The OS and architecture of the machine running this process.
    pub fn host() -> (String, String) {
        (
            std::env::consts::OS.to_string(),
            normalize_arch(std::env::consts::ARCH),
        )
    }

    /// All canonical targets, in table order.
    pub fn known_targets(&self) -> &'static [TargetEntry] {
        self.table
    }

    /// The platform for a canonical id. Generic ids are not in the table.
    pub fn lookup(&self, id: &str) -> Option<TargetPlatform> {
        self.table.iter().find(|e| e.id == id).map(|entry| {
            TargetPlatform::new(entry.os, entry.arch.to_string(), entry.id.to_string(), false)
        })
    }

    /// Canonical ids known for an OS family.
    pub fn targets_for(&self, os: OsFamily) -> Vec<&'static str> {
        self.table
            .iter()
            .filter(|e| e.os == os)
            .map(|e| e.id)
            .collect()
    }

    /// Resolve a probed OS/arch, optionally overridden by an explicit target
    /// id.
    ///
    /// An unknown architecture on a known OS family resolves to
    /// `generic-<arch>` and records a warning. An unknown OS family, an
    /// empty architecture or an override that names nothing in the table is
    /// an error.
    pub fn resolve(
        &self,
        os: &str,
        arch: &str,
        target_override: Option<&str>,
        log: &mut DecisionLog,
    ) -> Result<TargetPlatform, ConfigureError> {
        let arch = normalize_arch(arch);
        let unsupported = |reason: String| ConfigureError::UnsupportedPlatform {
            os: os.trim().to_string(),
            arch: arch.clone(),
            reason,
        };

        if let Some(id) = target_override {
            return self.resolve_override(id.trim(), os, &arch, log, unsupported);
        }

        let family = OsFamily::parse(os).ok_or_else(|| {
            unsupported(format!(
                "OS family `{}` is not one of: {}",
                os.trim(),
                OsFamily::ALL.map(|f| f.as_str()).join(", ")
            ))
        })?;

        if arch.is_empty() {
            return Err(unsupported("architecture is empty".to_string()));
        }

        if let Some(entry) = self.table.iter().find(|e| e.os == family && e.arch == arch) {
            log.note(
                Stage::Platform,
                format!("resolved {}/{} to `{}`", family, arch, entry.id),
            );
            return Ok(TargetPlatform::new(
                family,
                arch,
                entry.id.to_string(),
                false,
            ));
        }

        if !is_valid_arch_name(&arch) {
            return Err(unsupported(format!(
                "architecture `{}` contains characters outside [a-z0-9_]",
                arch
            )));
        }

        let id = format!("{}{}", GENERIC_PREFIX, arch);
        log.warn(
            Stage::Platform,
            format!(
                "no canonical target for {}/{}; falling back to `{}` (known for {}: {})",
                family,
                arch,
                id,
                family,
                self.targets_for(family).join(", ")
            ),
        );
        Ok(TargetPlatform::new(family, arch, id, true))
    }

    fn resolve_override(
        &self,
        id: &str,
        probed_os: &str,
        probed_arch: &str,
        log: &mut DecisionLog,
        unsupported: impl Fn(String) -> ConfigureError,
    ) -> Result<TargetPlatform, ConfigureError> {
        if let Some(entry) = self.table.iter().find(|e| e.id == id) {
            let probed = OsFamily::parse(probed_os);
            if probed != Some(entry.os) || probed_arch != entry.arch {
                log.note(
                    Stage::Platform,
                    format!(
                        "target override `{}` ({}/{}) differs from probed {}/{}",
                        entry.id,
                        entry.os,
                        entry.arch,
                        probed_os.trim(),
                        probed_arch
                    ),
                );
            } else {
                log.note(Stage::Platform, format!("using target override `{}`", entry.id));
            }
            return Ok(TargetPlatform::new(
                entry.os,
                entry.arch.to_string(),
                entry.id.to_string(),
                false,
            ));
        }

        if let Some(arch) = id.strip_prefix(GENERIC_PREFIX) {
            let family = OsFamily::parse(probed_os).ok_or_else(|| {
                unsupported(format!(
                    "`{}` needs a known OS family, got `{}`",
                    id,
                    probed_os.trim()
                ))
            })?;
            let arch = normalize_arch(arch);
            if arch.is_empty() || !is_valid_arch_name(&arch) {
                return Err(unsupported(format!("`{}` is not a valid generic target", id)));
            }
            log.warn(
                Stage::Platform,
                format!("using generic target `{}{}` on {}", GENERIC_PREFIX, arch, family),
            );
            let canonical = format!("{}{}", GENERIC_PREFIX, arch);
            return Ok(TargetPlatform::new(family, arch, canonical, true));
        }

        Err(unsupported(format!("unknown target id `{}`", id)))
    }
}

fn is_valid_arch_name(arch: &str) -> bool {
    arch.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(os: &str, arch: &str) -> Result<TargetPlatform, ConfigureError> {
        PlatformResolver::new().resolve(os, arch, None, &mut DecisionLog::new())
    }

    #[test]
    fn test_linux_x86_64() {
        let platform = resolve("linux", "x86_64").unwrap();
        assert_eq!(platform.canonical_id, "linux-x86_64");
        assert_eq!(platform.os_family, OsFamily::Linux);
        assert!(!platform.fallback);
        assert_eq!(platform.toolchain.compiler, "gcc");
        assert_eq!(platform.toolchain.shared_lib_extension, ".so");
    }

    #[test]
    fn test_aliases_and_case() {
        assert_eq!(resolve("macOS", "arm64").unwrap().canonical_id, "darwin64-arm64-cc");
        assert_eq!(resolve(" Linux ", "AMD64").unwrap().canonical_id, "linux-x86_64");
        assert_eq!(resolve("freebsd", "amd64").unwrap().canonical_id, "BSD-x86_64");
        assert_eq!(resolve("windows", "x64").unwrap().canonical_id, "VC-WIN64A");
        assert_eq!(resolve("android", "armv7l").unwrap().canonical_id, "android-arm");
        assert_eq!(resolve("linux", "i686").unwrap().canonical_id, "linux-x86");
    }

    #[test]
    fn test_resolution_is_deterministic() {
        for entry in TARGETS {
            let a = resolve(entry.os.as_str(), entry.arch).unwrap();
            let b = resolve(entry.os.as_str(), entry.arch).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.canonical_id, entry.id);
        }
    }

    #[test]
    fn test_unknown_arch_falls_back_with_warning() {
        let mut log = DecisionLog::new();
        let platform = PlatformResolver::new()
            .resolve("linux", "riscv32", None, &mut log)
            .unwrap();
        assert_eq!(platform.canonical_id, "generic-riscv32");
        assert!(platform.fallback);
        assert_eq!(log.warnings().count(), 1);
        assert!(log.render().contains("generic-riscv32"));
    }

    #[test]
    fn test_unknown_os_is_fatal() {
        let err = resolve("plan9", "x86_64").unwrap_err();
        assert!(matches!(err, ConfigureError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_empty_arch_is_fatal() {
        assert!(matches!(
            resolve("linux", "  ").unwrap_err(),
            ConfigureError::UnsupportedPlatform { .. }
        ));
    }

    #[test]
    fn test_override_wins() {
        let mut log = DecisionLog::new();
        let platform = PlatformResolver::new()
            .resolve("linux", "x86_64", Some("android-arm64"), &mut log)
            .unwrap();
        assert_eq!(platform.canonical_id, "android-arm64");
        assert_eq!(platform.os_family, OsFamily::Android);
        assert_eq!(platform.arch, "aarch64");
        assert!(log.render().contains("differs from probed"));
    }

    #[test]
    fn test_generic_override() {
        let platform = PlatformResolver::new()
            .resolve("linux", "x86_64", Some("generic-loongarch64"), &mut DecisionLog::new())
            .unwrap();
        assert_eq!(platform.canonical_id, "generic-loongarch64");
        assert!(platform.fallback);
    }

    #[test]
    fn test_lookup_by_canonical_id() {
        let resolver = PlatformResolver::new();
        let platform = resolver.lookup("VC-WIN64A").unwrap();
        assert_eq!(platform.os_family, OsFamily::Windows);
        assert_eq!(platform.arch, "x86_64");
        assert!(resolver.lookup("generic-loongarch64").is_none());
    }

    #[test]
    fn test_unknown_override_is_fatal() {
        let err = PlatformResolver::new()
            .resolve("linux", "x86_64", Some("linux-vax"), &mut DecisionLog::new())
            .unwrap_err();
        assert!(matches!(err, ConfigureError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_windows_toolchain() {
        let platform = resolve("win64", "x86_64").unwrap();
        assert_eq!(platform.toolchain.style, CommandStyle::Msvc);
        assert_eq!(platform.toolchain.dso_scheme, DsoScheme::Win32);
        assert_eq!(platform.toolchain.static_lib_extension, ".lib");
        assert!(platform
            .toolchain
            .platform_defines
            .contains(&"OPENSSL_SYS_WIN32".to_string()));
    }

    #[test]
    fn test_host_is_normalized() {
        let (_, arch) = PlatformResolver::host();
        assert_eq!(arch, normalize_arch(&arch));
    }
}
