//! `mooring features` command

use anyhow::Result;
use serde_json::json;

use crate::cli::FeaturesArgs;
use crate::commands::Session;
use mooring::ops::resolve_configuration;
use mooring::DecisionLog;

pub fn execute(args: FeaturesArgs, catalog: Option<std::path::PathBuf>) -> Result<()> {
    let session = Session::load(catalog)?;
    let opts = session.configure_options(&args.target)?;

    let mut log = DecisionLog::new();
    let config = resolve_configuration(&session.catalog, &opts, &mut log)?;

    let features: Vec<_> = config
        .features()
        .iter()
        .filter(|(_, state)| state.enabled || !args.enabled)
        .collect();

    if args.json {
        let list: Vec<_> = features
            .iter()
            .map(|(name, state)| {
                json!({
                    "name": name,
                    "enabled": state.enabled,
                    "origin": state.origin,
                })
            })
            .collect();
        let output = json!({
            "target": config.target().canonical_id,
            "features": list,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# Features for `{}`:", config.target().canonical_id);
    let width = features.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, state) in features {
        let mark = if state.enabled { "+" } else { "-" };
        println!("  {} {:<width$}    # {}", mark, name, state.origin, width = width);
    }

    Ok(())
}
