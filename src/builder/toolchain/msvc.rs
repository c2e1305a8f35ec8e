//! MSVC commands for nmake.

use crate::core::platform::ToolchainDefaults;

use super::{ArchiveInput, CommandSpec, CompileInput, Toolchain};

/// MSVC toolchain (Windows).
#[derive(Debug, Clone)]
pub struct MsvcToolchain {
    defaults: ToolchainDefaults,
}

impl MsvcToolchain {
    pub fn new(defaults: ToolchainDefaults) -> Self {
        MsvcToolchain { defaults }
    }
}

/// cmd builtins only understand backslashes.
fn native(path: &str) -> String {
    path.replace('/', "\\")
}

impl Toolchain for MsvcToolchain {
    fn defaults(&self) -> &ToolchainDefaults {
        &self.defaults
    }

    fn compile_command(&self, input: &CompileInput) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.defaults.compiler);

        cmd = cmd.args(input.cflags.iter().cloned());

        for dir in &input.include_dirs {
            cmd = cmd.arg(format!("/I{}", dir));
        }

        for define in &input.defines {
            cmd = cmd.arg(format!("/D{}", define));
        }

        cmd.arg("/c")
            .arg(&input.source)
            .arg(format!("/Fo{}", input.output))
    }

    fn archive_command(&self, input: &ArchiveInput) -> CommandSpec {
        CommandSpec::new(&self.defaults.archiver)
            .arg("/nologo")
            .arg(format!("/OUT:{}", input.output))
            .args(input.objects.iter().cloned())
    }

    fn mkdir_command(&self, dir: &str) -> CommandSpec {
        let dir = native(dir);
        CommandSpec::new("if")
            .args(["not", "exist"])
            .arg(&dir)
            .arg("mkdir")
            .arg(&dir)
    }

    fn copy_command(&self, from: &str, to_dir: &str) -> CommandSpec {
        CommandSpec::new("copy")
            .arg("/Y")
            .arg(native(from))
            .arg(native(to_dir))
    }

    fn remove_command(&self, paths: &[String]) -> CommandSpec {
        CommandSpec::new("del")
            .args(["/Q", "/F"])
            .args(paths.iter().map(|p| native(p)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::{CommandStyle, OsFamily};

    fn toolchain() -> MsvcToolchain {
        MsvcToolchain::new(ToolchainDefaults::for_platform(OsFamily::Windows, "x86_64"))
    }

    #[test]
    fn test_compile_command() {
        let cmd = toolchain().compile_command(&CompileInput {
            source: "crypto/mem.c".to_string(),
            output: "crypto/libcrypto-lib-mem.obj".to_string(),
            include_dirs: vec!["include".to_string()],
            defines: vec!["OPENSSL_SYS_WIN32".to_string()],
            cflags: vec!["/O2".to_string()],
        });
        assert_eq!(
            cmd.to_recipe(CommandStyle::Msvc),
            "cl /O2 /Iinclude /DOPENSSL_SYS_WIN32 /c crypto/mem.c /Focrypto/libcrypto-lib-mem.obj"
        );
    }

    #[test]
    fn test_archive_command() {
        let cmd = toolchain().archive_command(&ArchiveInput {
            objects: vec!["a.obj".to_string()],
            output: "libcrypto.lib".to_string(),
        });
        assert_eq!(
            cmd.to_recipe(CommandStyle::Msvc),
            "lib /nologo /OUT:libcrypto.lib a.obj"
        );
    }

    #[test]
    fn test_install_commands_use_backslashes() {
        let tc = toolchain();
        assert_eq!(
            tc.mkdir_command("C:/OpenSSL/lib").to_recipe(CommandStyle::Msvc),
            "if not exist C:\\OpenSSL\\lib mkdir C:\\OpenSSL\\lib"
        );
        assert_eq!(
            tc.remove_command(&["providers/legacy.lib".to_string()])
                .to_recipe(CommandStyle::Msvc),
            "del /Q /F providers\\legacy.lib"
        );
    }
}
