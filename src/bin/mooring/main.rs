//! Mooring CLI - configuration resolution for OpenSSL-style packages

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mooring::core::errors::ConfigureError;
use mooring::util::diagnostic::emit;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<ConfigureError>() {
            Some(err) => emit(&err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("mooring=debug")
    } else {
        EnvFilter::new("mooring=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let catalog = cli.catalog;

    // Execute command
    match cli.command {
        Commands::Configure(args) => commands::configure::execute(args, catalog),
        Commands::Features(args) => commands::features::execute(args, catalog),
        Commands::Plan(args) => commands::plan::execute(args, catalog),
        Commands::Targets(args) => commands::targets::execute(args),
        Commands::Validate(args) => commands::validate::execute(args, catalog),
        Commands::Matrix(args) => commands::matrix::execute(args, catalog),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
