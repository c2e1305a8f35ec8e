//! `mooring validate` command

use anyhow::Result;

use crate::cli::ValidateArgs;
use crate::commands::Session;
use mooring::builder::dump::JSON_DUMP;
use mooring::builder::parity::DumpMeasurement;
use mooring::builder::ParityValidator;
use mooring::core::platform::PlatformResolver;
use mooring::ConfigureError;

pub fn execute(args: ValidateArgs, catalog: Option<std::path::PathBuf>) -> Result<()> {
    let session = Session::load(catalog)?;

    let mut validator = ParityValidator::new(session.catalog.references().to_vec());
    validator.add_references(session.references(&args.references)?);

    let dump = session.cwd.join(&args.dir).join(JSON_DUMP);
    let measurement = DumpMeasurement::from_file(&dump)?;
    if let Some(platform) = PlatformResolver::new().lookup(&measurement.target_id) {
        let defaults = session.catalog.features().defaults_for(&platform);
        validator.set_defaults(measurement.target_id.clone(), defaults);
    }
    let report = validator.check(measurement);
    let target = report.measurement.target_id.clone();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let m = &report.measurement;
        println!("# Parity for `{}` ({}):", target, dump.display());
        println!("  {} bytes, {} keys, {} disabled features", m.bytes, m.keys, m.disabled_features);
        match report.reference {
            Some(ref r) => println!(
                "  reference: >= {} bytes, >= {} keys, >= {} disabled features",
                r.min_dump_bytes, r.min_dump_keys, r.min_disabled_features
            ),
            None => println!("  no reference for this target"),
        }
        for warning in &report.warnings {
            println!("  warning: {}", warning);
        }
        if report.is_complete() {
            println!("  ok");
        }
    }

    if args.strict && !report.is_complete() {
        return Err(ConfigureError::IncompleteGeneration {
            target,
            details: report.warnings.iter().map(|w| w.to_string()).collect(),
        }
        .into());
    }

    Ok(())
}
