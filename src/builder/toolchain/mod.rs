//! Toolchain command rendering.
//!
//! The descriptor never runs a compiler. It writes the literal command
//! lines a build tool will run later, so each toolchain only has to know
//! how its commands are spelled.

use crate::core::platform::{CommandStyle, TargetPlatform, ToolchainDefaults};

mod gnu;
mod msvc;

pub use gnu::GnuToolchain;
pub use msvc::MsvcToolchain;

/// A command line, with optional stdout redirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to run (e.g., "gcc", "cl")
    pub program: String,
    /// Command arguments
    pub args: Vec<String>,
    /// File stdout is redirected to
    pub stdout: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        CommandSpec {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn redirect_to(mut self, path: impl Into<String>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Render as one recipe line for a makefile.
    ///
    /// Arguments are quoted for the shell the style runs under and `$` is
    /// doubled so make passes it through.
    pub fn to_recipe(&self, style: CommandStyle) -> String {
        let mut words = Vec::with_capacity(self.args.len() + 3);
        words.push(quote(&self.program, style));
        words.extend(self.args.iter().map(|a| quote(a, style)));
        if let Some(ref out) = self.stdout {
            words.push(">".to_string());
            words.push(quote(out, style));
        }
        words.join(" ").replace('$', "$$")
    }
}

fn needs_quoting(word: &str) -> bool {
    word.is_empty()
        || word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '&' | '|' | ';' | '<' | '>' | '(' | ')' | '*' | '?' | '`'))
}

fn quote(word: &str, style: CommandStyle) -> String {
    match style {
        // Backslashes are path separators under cmd.
        CommandStyle::Msvc if !word.contains(|c: char| c.is_whitespace() || c == '"') => {
            word.to_string()
        }
        CommandStyle::Msvc => format!("\"{}\"", word.replace('"', "\\\"")),
        CommandStyle::Gnu if !needs_quoting(word) => word.to_string(),
        CommandStyle::Gnu => format!("'{}'", word.replace('\'', "'\\''")),
    }
}

/// Input for a compile step.
#[derive(Debug, Clone)]
pub struct CompileInput {
    pub source: String,
    pub output: String,
    pub include_dirs: Vec<String>,
    /// `NAME` or `NAME=VALUE`
    pub defines: Vec<String>,
    pub cflags: Vec<String>,
}

/// Input for an archive step (creating static library).
#[derive(Debug, Clone)]
pub struct ArchiveInput {
    pub objects: Vec<String>,
    pub output: String,
}

/// Spells commands for one family of compilers.
pub trait Toolchain: Send + Sync {
    fn defaults(&self) -> &ToolchainDefaults;

    fn style(&self) -> CommandStyle {
        self.defaults().style
    }

    /// Compile one source file to an object.
    fn compile_command(&self, input: &CompileInput) -> CommandSpec;

    /// Archive objects into a static library.
    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec;

    /// Create a directory, including parents.
    fn mkdir_command(&self, dir: &str) -> CommandSpec;

    /// Copy `from` into the directory `to_dir`.
    fn copy_command(&self, from: &str, to_dir: &str) -> CommandSpec;

    /// Remove files, ignoring ones that do not exist.
    fn remove_command(&self, paths: &[String]) -> CommandSpec;

    /// Object path for `source`, built as part of `unit`.
    ///
    /// `crypto/aes/aes_core.c` in `libcrypto` becomes
    /// `crypto/aes/libcrypto-lib-aes_core.o`, so one source compiled into two
    /// units never shares an object.
    fn object_path(&self, unit: &str, source: &str) -> String {
        let (dir, file) = match source.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, source),
        };
        let stem = file.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(file);
        let object = format!("{}-lib-{}{}", unit, stem, self.defaults().object_extension);
        match dir {
            Some(dir) => format!("{}/{}", dir, object),
            None => object,
        }
    }

    /// File name of the static library called `name` (`crypto` -> `libcrypto.a`).
    fn static_library(&self, name: &str) -> String {
        let defaults = self.defaults();
        format!(
            "{}{}{}",
            defaults.static_lib_prefix, name, defaults.static_lib_extension
        )
    }
}

/// The toolchain that spells commands for `platform`.
pub fn toolchain_for(platform: &TargetPlatform) -> Box<dyn Toolchain> {
    let defaults = platform.toolchain.clone();
    match defaults.style {
        CommandStyle::Gnu => Box::new(GnuToolchain::new(defaults)),
        CommandStyle::Msvc => Box::new(MsvcToolchain::new(defaults)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::OsFamily;

    fn gnu() -> GnuToolchain {
        GnuToolchain::new(ToolchainDefaults::for_platform(OsFamily::Linux, "x86_64"))
    }

    #[test]
    fn test_plain_words_are_not_quoted() {
        let cmd = CommandSpec::new("gcc").args(["-O3", "-c", "a.c"]);
        assert_eq!(cmd.to_recipe(CommandStyle::Gnu), "gcc -O3 -c a.c");
    }

    #[test]
    fn test_gnu_quoting_and_dollar_escape() {
        let cmd = CommandSpec::new("gcc")
            .arg("-DOPENSSLDIR=\"/usr/local/ssl\"")
            .arg("-DCOST=$5");
        assert_eq!(
            cmd.to_recipe(CommandStyle::Gnu),
            "gcc '-DOPENSSLDIR=\"/usr/local/ssl\"' -DCOST=$$5"
        );
    }

    #[test]
    fn test_msvc_quoting() {
        let cmd = CommandSpec::new("cl").arg("/DOPENSSLDIR=\"C:\\Program Files\"");
        assert_eq!(
            cmd.to_recipe(CommandStyle::Msvc),
            "cl \"/DOPENSSLDIR=\\\"C:\\Program Files\\\"\""
        );
    }

    #[test]
    fn test_redirect() {
        let cmd = CommandSpec::new("perl")
            .arg("util/dofile.pl")
            .redirect_to("include/openssl/opensslv.h");
        assert_eq!(
            cmd.to_recipe(CommandStyle::Gnu),
            "perl util/dofile.pl > include/openssl/opensslv.h"
        );
    }

    #[test]
    fn test_object_path() {
        let tc = gnu();
        assert_eq!(
            tc.object_path("libcrypto", "crypto/aes/aes_core.c"),
            "crypto/aes/libcrypto-lib-aes_core.o"
        );
        assert_eq!(tc.object_path("libssl", "main.c"), "libssl-lib-main.o");
    }

    #[test]
    fn test_toolchain_for_style() {
        let resolver = crate::core::platform::PlatformResolver::new();
        let mut log = crate::util::log::DecisionLog::new();
        let win = resolver.resolve("windows", "x86_64", None, &mut log).unwrap();
        let tc = toolchain_for(&win);
        assert_eq!(tc.style(), CommandStyle::Msvc);
        assert_eq!(tc.static_library("crypto"), "libcrypto.lib");

        let linux = resolver.resolve("linux", "x86_64", None, &mut log).unwrap();
        assert_eq!(toolchain_for(&linux).static_library("crypto"), "libcrypto.a");
    }
}
