//! Build descriptor emission.
//!
//! The descriptor is assembled completely in memory: makefile rules, the
//! JSON dump and every config-dump artifact. Only when all of it has been
//! rendered is anything written, and then every file goes through a staged
//! atomic rename.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use crate::builder::dump::{render_perl, ConfigDump, JSON_DUMP};
use crate::builder::planner::ArtifactPlan;
use crate::builder::toolchain::{toolchain_for, ArchiveInput, CommandSpec, CompileInput, Toolchain};
use crate::core::artifact::{GeneratedArtifact, Generator};
use crate::core::errors::ConfigureError;
use crate::core::module::{InstallDir, ResolvedModule};
use crate::core::platform::CommandStyle;
use crate::core::state::Configuration;
use crate::util::fs::write_all_atomic;

/// Name of the makefile in the output directory.
pub const MAKEFILE: &str = "Makefile";

/// One makefile rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub target: String,
    pub prerequisites: Vec<String>,
    pub recipe: Vec<String>,
    pub comment: Option<String>,
}

impl Rule {
    fn new(target: impl Into<String>) -> Self {
        Rule {
            target: target.into(),
            prerequisites: Vec::new(),
            recipe: Vec::new(),
            comment: None,
        }
    }

    fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    fn needs(mut self, prerequisites: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.prerequisites
            .extend(prerequisites.into_iter().map(|p| p.into()));
        self
    }

    fn run(mut self, command: &CommandSpec, style: CommandStyle) -> Self {
        self.recipe.push(command.to_recipe(style));
        self
    }

    fn render(&self, out: &mut String) {
        if let Some(ref comment) = self.comment {
            let _ = writeln!(out, "# {}", comment);
        }
        if self.prerequisites.is_empty() {
            let _ = writeln!(out, "{}:", self.target);
        } else {
            let _ = writeln!(out, "{}: {}", self.target, self.prerequisites.join(" "));
        }
        for line in &self.recipe {
            let _ = writeln!(out, "\t{}", line);
        }
    }
}

/// A file copied by `make install`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallEntry {
    pub source: String,
    pub destination_dir: String,
}

/// Everything emitted for one configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct BuildDescriptor {
    rules: Vec<Rule>,
    phony: Vec<String>,
    install: Vec<InstallEntry>,
    dump: ConfigDump,
    files: Vec<(String, Vec<u8>)>,
}

impl BuildDescriptor {
    /// Rules in makefile order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, target: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.target == target)
    }

    pub fn phony_targets(&self) -> &[String] {
        &self.phony
    }

    pub fn install_entries(&self) -> &[InstallEntry] {
        &self.install
    }

    pub fn dump(&self) -> &ConfigDump {
        &self.dump
    }

    /// Rendered files as `(relative path, contents)`, makefile first.
    pub fn files(&self) -> &[(String, Vec<u8>)] {
        &self.files
    }

    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files
            .iter()
            .find(|(path, _)| path == name)
            .map(|(_, contents)| contents.as_slice())
    }

    pub fn makefile(&self) -> &str {
        self.file(MAKEFILE)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .unwrap_or_default()
    }

    /// Write every file into `dir`. Either all files are replaced or none.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let written = write_all_atomic(dir, &self.files)?;
        tracing::info!("wrote {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Path of the static archive built for `module`.
pub fn archive_path(toolchain: &dyn Toolchain, module: &ResolvedModule) -> String {
    let file = toolchain.static_library(&module.name);
    let dir = module.dir.trim_end_matches('/');
    if dir.is_empty() || dir == "." {
        file
    } else {
        format!("{}/{}", dir, file)
    }
}

/// The command that regenerates a configuration from scratch.
pub fn reconfigure_command(config: &Configuration) -> CommandSpec {
    let target = config.target();
    let install = config.install();
    let mut cmd = CommandSpec::new("mooring")
        .arg("configure")
        .args(["--os", target.os_family.as_str()])
        .args(["--arch", target.arch.as_str()])
        .args(["--target", target.canonical_id.as_str()])
        .args(["--prefix", install.prefix.as_str()]);
    if let Some(ref dir) = install.openssldir {
        cmd = cmd.args(["--openssldir", dir.as_str()]);
    }
    cmd = cmd.args(["--libdir", install.libdir.as_str()]);
    for (key, value) in &install.extra {
        cmd = cmd.arg("--set").arg(format!("{}={}", key, value));
    }
    cmd = cmd.args(["--out-dir", "."]);
    if !config.tokens().is_empty() {
        cmd = cmd.arg("--").args(config.tokens().iter().cloned());
    }
    cmd
}

/// Turns a frozen configuration and its plans into a [`BuildDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct BuildDescriptorEmitter {
    reconfigure: Option<CommandSpec>,
}

impl BuildDescriptorEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `command` in config-dump rules instead of the derived one.
    pub fn with_reconfigure_command(mut self, command: CommandSpec) -> Self {
        self.reconfigure = Some(command);
        self
    }

    /// Build the descriptor.
    ///
    /// `modules` must be in build order and `plan` must cover every header
    /// they need; anything else is refused with `InconsistentPlan`.
    pub fn build(
        &self,
        config: &Configuration,
        plan: &ArtifactPlan,
        modules: &[ResolvedModule],
    ) -> Result<BuildDescriptor, ConfigureError> {
        plan.verify()?;
        check_modules(plan, modules)?;

        let toolchain = toolchain_for(config.target());
        let style = toolchain.style();
        let reconfigure = self
            .reconfigure
            .clone()
            .unwrap_or_else(|| reconfigure_command(config));

        let mut rules = Vec::new();
        let archives: Vec<String> = modules
            .iter()
            .map(|m| archive_path(toolchain.as_ref(), m))
            .collect();

        rules.push(Rule::new("all").needs(["build_generated", "build_modules"]));
        rules.push(Rule::new("build_generated").needs(plan.paths()));
        rules.push(Rule::new("build_modules").needs(archives.iter().cloned()));

        for artifact in plan.iter() {
            rules.push(artifact_rule(artifact, config, &reconfigure, style));
        }

        let mut objects = Vec::new();
        for (module, archive) in modules.iter().zip(&archives) {
            let module_rules = module_rules(module, archive, config, toolchain.as_ref());
            objects.extend(module_rules.iter().skip(1).map(|r| r.target.clone()));
            rules.extend(module_rules);
        }

        let install = install_entries(config, plan, modules, &archives);
        rules.push(install_rule(&install, toolchain.as_ref()));

        let mut removable: Vec<String> = objects;
        removable.extend(archives.iter().cloned());
        removable.extend(
            plan.iter()
                .filter(|a| !a.is_config_dump())
                .map(|a| a.path.clone()),
        );
        rules.push(
            Rule::new("clean")
                .comment("configuration dumps are kept; re-run configure to replace them")
                .run(&toolchain.remove_command(&removable), style),
        );

        let phony: Vec<String> = ["all", "build_generated", "build_modules", "install", "clean"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let dump = ConfigDump::new(config, plan, modules, toolchain.as_ref());
        let json = dump
            .to_json()
            .map_err(|e| ConfigureError::InconsistentPlan {
                message: format!("{:#}", e),
            })?;

        let mut files = vec![(
            MAKEFILE.to_string(),
            render_makefile(config, &rules, &phony).into_bytes(),
        )];
        files.push((JSON_DUMP.to_string(), json.clone().into_bytes()));
        for artifact in plan.config_dumps() {
            if artifact.path == JSON_DUMP {
                continue;
            }
            let contents = if artifact.path.ends_with(".pm") {
                render_perl(&dump, config)
            } else {
                json.clone()
            };
            files.push((artifact.path.clone(), contents.into_bytes()));
        }

        tracing::debug!(
            "descriptor for {}: {} rules, {} files",
            config.target().canonical_id,
            rules.len(),
            files.len()
        );

        Ok(BuildDescriptor {
            rules,
            phony,
            install,
            dump,
            files,
        })
    }
}

/// Every header a module needs is planned, and modules follow the modules
/// they require.
fn check_modules(plan: &ArtifactPlan, modules: &[ResolvedModule]) -> Result<(), ConfigureError> {
    let mut built: BTreeSet<&str> = BTreeSet::new();
    for module in modules {
        if let Some(header) = module.required_headers.iter().find(|h| !plan.contains(h)) {
            return Err(ConfigureError::InconsistentPlan {
                message: format!(
                    "module `{}` needs `{}`, which is not in the artifact plan",
                    module.name, header
                ),
            });
        }
        if let Some(dep) = module
            .requires_modules
            .iter()
            .find(|d| !built.contains(d.as_str()))
        {
            return Err(ConfigureError::InconsistentPlan {
                message: format!("module `{}` is ordered before `{}`", module.name, dep),
            });
        }
        built.insert(&module.name);
    }
    Ok(())
}

fn artifact_rule(
    artifact: &GeneratedArtifact,
    config: &Configuration,
    reconfigure: &CommandSpec,
    style: CommandStyle,
) -> Rule {
    let rule = Rule::new(&artifact.path).comment(artifact.generator.kind());
    match artifact.generator {
        Generator::ConfigDump => rule
            .needs([JSON_DUMP])
            .needs(artifact.depends_on.iter().cloned())
            .run(reconfigure, style),
        Generator::TemplateExpansion { ref template } => {
            let cmd = CommandSpec::new("perl")
                .args(["-I.", "-Mconfigdata", "util/dofile.pl", "-oMakefile"])
                .arg(template)
                .redirect_to(&artifact.path);
            rule.needs([template.clone()])
                .needs(artifact.depends_on.iter().cloned())
                .run(&cmd, style)
        }
        Generator::SymbolTable {
            ref ordinals,
            ref library,
        } => {
            let cmd = CommandSpec::new("perl")
                .arg("util/mkdef.pl")
                .args(["--ordinals", ordinals.as_str()])
                .args(["--name", library.as_str()])
                .args(["--OS", config.target().os_family.as_str()])
                .redirect_to(&artifact.path);
            rule.needs([ordinals.clone()])
                .needs(artifact.depends_on.iter().cloned())
                .run(&cmd, style)
        }
    }
}

/// The archive rule followed by one compile rule per source.
fn module_rules(
    module: &ResolvedModule,
    archive: &str,
    config: &Configuration,
    toolchain: &dyn Toolchain,
) -> Vec<Rule> {
    let style = toolchain.style();
    let unit = format!("lib{}", module.name);
    let headers: Vec<String> = module.required_headers.iter().cloned().collect();

    let mut compile_rules = Vec::with_capacity(module.sources.len());
    let mut objects = Vec::with_capacity(module.sources.len());
    for source in &module.sources {
        let object = toolchain.object_path(&unit, source);
        let cmd = toolchain.compile_command(&CompileInput {
            source: source.clone(),
            output: object.clone(),
            include_dirs: config.package().include_dirs.clone(),
            defines: config.defines().to_vec(),
            cflags: config.compiler_flags().to_vec(),
        });
        compile_rules.push(
            Rule::new(&object)
                .needs([source.clone()])
                .needs(headers.iter().cloned())
                .run(&cmd, style),
        );
        objects.push(object);
    }

    let archive_cmd = toolchain.archive_command(&ArchiveInput {
        objects: objects.clone(),
        output: archive.to_string(),
    });
    let mut rules = vec![Rule::new(archive)
        .comment(format!("{} `{}`", module.kind, module.name))
        .needs(objects)
        .run(&archive_cmd, style)];
    rules.extend(compile_rules);
    rules
}

fn install_entries(
    config: &Configuration,
    plan: &ArtifactPlan,
    modules: &[ResolvedModule],
    archives: &[String],
) -> Vec<InstallEntry> {
    let paths = config.install();
    let mut entries = Vec::new();

    for (module, archive) in modules.iter().zip(archives) {
        let destination_dir = match module.install {
            InstallDir::None => continue,
            InstallDir::Lib => paths.libdir_path(),
            InstallDir::Modules => paths.modulesdir(),
        };
        entries.push(InstallEntry {
            source: archive.clone(),
            destination_dir,
        });
    }

    // Generated public headers land under the install include tree.
    for artifact in plan.iter() {
        let Some(relative) = artifact.path.strip_prefix("include/openssl/") else {
            continue;
        };
        let subdir = match relative.rsplit_once('/') {
            Some((dir, _)) => format!("{}/openssl/{}", paths.includedir(), dir),
            None => format!("{}/openssl", paths.includedir()),
        };
        entries.push(InstallEntry {
            source: artifact.path.clone(),
            destination_dir: subdir,
        });
    }
    entries
}

fn install_rule(entries: &[InstallEntry], toolchain: &dyn Toolchain) -> Rule {
    let style = toolchain.style();
    let mut rule = Rule::new("install").needs(["build_generated", "build_modules"]);
    let mut created: BTreeSet<&str> = BTreeSet::new();
    for entry in entries {
        if created.insert(entry.destination_dir.as_str()) {
            rule = rule.run(&toolchain.mkdir_command(&entry.destination_dir), style);
        }
        rule = rule.run(
            &toolchain.copy_command(&entry.source, &entry.destination_dir),
            style,
        );
    }
    rule
}

fn render_makefile(config: &Configuration, rules: &[Rule], phony: &[String]) -> String {
    let package = config.package();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# Makefile for {} {} on {}",
        package.name,
        package.version,
        config.target().canonical_id
    );
    out.push_str("# Generated by mooring. Do not edit; re-run configure instead.\n");
    let _ = writeln!(out, "# Configuration fingerprint: {}", config.fingerprint());
    if !config.tokens().is_empty() {
        let _ = writeln!(out, "# Options: {}", config.tokens().join(" "));
    }
    out.push('\n');
    let _ = writeln!(out, ".PHONY: {}", phony.join(" "));

    for rule in rules {
        out.push('\n');
        rule.render(&mut out);
    }
    out
}
