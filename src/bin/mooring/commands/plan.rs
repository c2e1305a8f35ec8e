//! `mooring plan` command

use anyhow::Result;
use serde_json::json;

use crate::cli::PlanArgs;
use crate::commands::Session;
use mooring::ops::{plan_configuration, resolve_configuration};
use mooring::DecisionLog;

pub fn execute(args: PlanArgs, catalog: Option<std::path::PathBuf>) -> Result<()> {
    let session = Session::load(catalog)?;
    let opts = session.configure_options(&args.target)?;

    let mut log = DecisionLog::new();
    let config = resolve_configuration(&session.catalog, &opts, &mut log)?;
    let (modules, plan) = plan_configuration(&session.catalog, &config, &mut log)?;

    if args.json {
        let artifacts: Vec<_> = plan
            .iter()
            .map(|a| {
                json!({
                    "path": a.path,
                    "stage": a.stage(),
                    "generator": a.generator.kind(),
                    "depends_on": a.depends_on,
                })
            })
            .collect();
        let output = json!({
            "target": config.target().canonical_id,
            "fingerprint": config.fingerprint(),
            "modules": modules,
            "artifacts": artifacts,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# Build order for `{}`:", config.target().canonical_id);
    for (i, module) in modules.iter().enumerate() {
        println!(
            "  {:>2}. {} ({}, {} sources)",
            i + 1,
            module.name,
            module.kind,
            module.sources.len()
        );
    }

    println!();
    println!("# Generated artifacts:");
    for artifact in plan.iter() {
        println!(
            "  [{}] {}    # {}",
            artifact.stage(),
            artifact.path,
            artifact.generator.kind()
        );
    }

    Ok(())
}
