//! GCC/Clang-style commands.

use crate::core::platform::ToolchainDefaults;

use super::{ArchiveInput, CommandSpec, CompileInput, Toolchain};

/// GCC/Clang toolchain (Unix-like systems).
#[derive(Debug, Clone)]
pub struct GnuToolchain {
    defaults: ToolchainDefaults,
}

impl GnuToolchain {
    pub fn new(defaults: ToolchainDefaults) -> Self {
        GnuToolchain { defaults }
    }
}

impl Toolchain for GnuToolchain {
    fn defaults(&self) -> &ToolchainDefaults {
        &self.defaults
    }

    fn compile_command(&self, input: &CompileInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.defaults.compiler);

        cmd = cmd.args(input.cflags.iter().cloned());

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("-I{}", dir));
        }

        for define in &input.defines {
            cmd = cmd.arg(format!("-D{}", define));
        }

        cmd.arg("-c")
            .arg(&input.source)
            .arg("-o")
            .arg(&input.output)
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        // Create archive with symbol index, replace files
        CommandSpec::new(&self.defaults.archiver)
            .arg("rcs")
            .arg(&input.output)
            .args(input.objects.iter().cloned())
    }

    fn mkdir_command(&self, dir: &str) -> CommandSpec {
        CommandSpec::new("mkdir").arg("-p").arg(dir)
    }

    fn copy_command(&self, from: &str, to_dir: &str) -> CommandSpec {
        CommandSpec::new("cp").arg(from).arg(format!("{}/", to_dir))
    }

    fn remove_command(&self, paths: &[String]) -> CommandSpec {
        CommandSpec::new("rm").arg("-f").args(paths.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{CommandStyle, OsFamily};

    fn toolchain() -> GnuToolchain {
        GnuToolchain::new(ToolchainDefaults::for_platform(OsFamily::Linux, "x86_64"))
    }

    #[test]
    fn test_compile_command() {
        let cmd = toolchain().compile_command(&CompileInput {
            source: "crypto/mem.c".to_string(),
            output: "crypto/libcrypto-lib-mem.o".to_string(),
            include_dirs: vec!["include".to_string()],
            defines: vec!["L_ENDIAN".to_string(), "OPENSSL_NO_MD2".to_string()],
            cflags: vec!["-O3".to_string(), "-Wall".to_string()],
        });
        assert_eq!(
            cmd.to_recipe(CommandStyle::Gnu),
            "gcc -O3 -Wall -Iinclude -DL_ENDIAN -DOPENSSL_NO_MD2 -c crypto/mem.c -o crypto/libcrypto-lib-mem.o"
        );
    }

    #[test]
    fn test_archive_command() {
        let cmd = toolchain().archive_command(&ArchiveInput {
            objects: vec!["a.o".to_string(), "b.o".to_string()],
            output: "libcrypto.a".to_string(),
        });
        assert_eq!(cmd.to_recipe(CommandStyle::Gnu), "ar rcs libcrypto.a a.o b.o");
    }

    #[test]
    fn test_install_commands() {
        let tc = toolchain();
        assert_eq!(
            tc.mkdir_command("/usr/local/lib").to_recipe(CommandStyle::Gnu),
            "mkdir -p /usr/local/lib"
        );
        assert_eq!(
            tc.copy_command("libcrypto.a", "/usr/local/lib")
                .to_recipe(CommandStyle::Gnu),
            "cp libcrypto.a /usr/local/lib/"
        );
    }
}
