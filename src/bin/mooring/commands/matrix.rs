//! `mooring matrix` command

use anyhow::{bail, Result};

use crate::cli::MatrixArgs;
use crate::commands::Session;
use mooring::ops::{all_targets, load_matrix, run_matrix, MatrixOptions};

pub fn execute(args: MatrixArgs, catalog: Option<std::path::PathBuf>) -> Result<()> {
    let session = Session::load(catalog)?;

    let entries = match args.file {
        Some(ref path) => load_matrix(&session.cwd.join(path))?,
        None => all_targets(),
    };
    let opts = MatrixOptions {
        install: session.config.install_paths(),
        out_dir: args.out_dir.as_ref().map(|dir| session.cwd.join(dir)),
        strict_parity: args.strict_parity || session.config.parity.strict,
    };

    let outcomes = run_matrix(&session.catalog, &entries, &opts);
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            let options = outcome.entry.options.join(" ");
            match outcome.result {
                Ok(ref ok) => {
                    println!(
                        "  ok    {:<24} {} {}",
                        ok.target_id,
                        &ok.fingerprint[..ok.fingerprint.len().min(8)],
                        options
                    );
                    for warning in &ok.parity_warnings {
                        println!("        warning: {}", warning);
                    }
                }
                Err(ref e) => {
                    println!("  FAIL  {}/{} {}", outcome.entry.os, outcome.entry.arch, options);
                    println!("        {}", e);
                }
            }
        }
        println!("{} configurations, {} failed", outcomes.len(), failed);
    }

    if failed > 0 {
        bail!("{} of {} configurations failed", failed, outcomes.len());
    }
    Ok(())
}
