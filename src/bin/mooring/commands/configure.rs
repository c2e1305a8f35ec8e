//! `mooring configure` command

use anyhow::Result;

use crate::cli::ConfigureArgs;
use crate::commands::Session;
use mooring::ops::configure;

pub fn execute(args: ConfigureArgs, catalog: Option<std::path::PathBuf>) -> Result<()> {
    let session = Session::load(catalog)?;
    let mut opts = session.configure_options(&args.target)?;

    if let Some(ref out_dir) = args.out_dir {
        opts.out_dir = session.cwd.join(out_dir);
    }
    opts.dry_run = args.dry_run;
    opts.strict_parity |= args.strict_parity;
    opts.extra_references.extend(session.references(&args.references)?);

    let result = configure(&session.catalog, &opts)?;
    let config = &result.configuration;

    if args.show_log {
        print!("{}", result.log.render());
    }

    println!(
        "Configured {} for {} {}",
        config.target().canonical_id,
        config.package().name,
        config.package().version
    );
    println!(
        "  {} features enabled, {} disabled, {} modules",
        config.enabled_features().len(),
        config.disabled_features().len(),
        result.modules.len()
    );
    println!("  fingerprint {}", config.fingerprint());

    if opts.dry_run {
        for (name, _) in result.descriptor.files() {
            println!("  would write {}", name);
        }
    } else {
        for path in &result.written {
            println!("  wrote {}", path.display());
        }
    }

    for warning in &result.parity.warnings {
        println!("  warning: {}", warning);
    }

    Ok(())
}
