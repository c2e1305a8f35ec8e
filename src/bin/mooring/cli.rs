//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// Mooring - configure OpenSSL-style packages into build descriptors
#[derive(Parser)]
#[command(name = "mooring")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Catalog to use instead of the built-in one
    #[arg(long, global = true, env = "MOORING_CATALOG")]
    pub catalog: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a configuration and write the build descriptor
    Configure(ConfigureArgs),

    /// Show every feature with its resolved state and the reason for it
    Features(FeaturesArgs),

    /// Show module build order and generated artifacts in generation order
    Plan(PlanArgs),

    /// List known canonical targets
    Targets(TargetsArgs),

    /// Check written configuration dumps against parity references
    Validate(ValidateArgs),

    /// Configure many targets and option sets in parallel
    Matrix(MatrixArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Target selection, install paths and option tokens.
#[derive(Args, Clone, Debug)]
pub struct TargetArgs {
    /// Operating system (defaults to the host)
    #[arg(long)]
    pub os: Option<String>,

    /// Architecture (defaults to the host)
    #[arg(long)]
    pub arch: Option<String>,

    /// Canonical target id, e.g. linux-x86_64
    #[arg(long)]
    pub target: Option<String>,

    /// Installation prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Directory for configuration files and modules
    #[arg(long)]
    pub openssldir: Option<String>,

    /// Library directory, relative to the prefix unless absolute
    #[arg(long)]
    pub libdir: Option<String>,

    /// Extra install path passed through to the dump
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// Option tokens: enable-<feature>, no-<feature>, -D<define>, ...
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub options: Vec<String>,
}

#[derive(Args)]
pub struct ConfigureArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output directory for the makefile and dumps
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Resolve and render, but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Fail when the dump is smaller than its parity reference
    #[arg(long)]
    pub strict_parity: bool,

    /// Additional parity reference file
    #[arg(long = "reference")]
    pub references: Vec<PathBuf>,

    /// Print the decision log
    #[arg(long)]
    pub show_log: bool,
}

#[derive(Args)]
pub struct FeaturesArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only list enabled features
    #[arg(long)]
    pub enabled: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct TargetsArgs {
    /// Only list targets for this OS family
    #[arg(long)]
    pub os: Option<String>,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Directory holding configdata.json
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Exit with an error when any metric is below its reference
    #[arg(long)]
    pub strict: bool,

    /// Additional parity reference file
    #[arg(long = "reference")]
    pub references: Vec<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct MatrixArgs {
    /// Matrix file with [[entry]] tables (defaults to every known target)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Write each configuration to <out-dir>/<target>-<fingerprint>
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Count parity warnings as failures
    #[arg(long)]
    pub strict_parity: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}
