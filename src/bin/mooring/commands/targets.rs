//! `mooring targets` command

use anyhow::{bail, Result};

use crate::cli::TargetsArgs;
use mooring::core::{OsFamily, PlatformResolver};

pub fn execute(args: TargetsArgs) -> Result<()> {
    let filter = match args.os {
        Some(ref os) => match OsFamily::parse(os) {
            Some(family) => Some(family),
            None => bail!("unknown OS family `{}`", os),
        },
        None => None,
    };

    let resolver = PlatformResolver::new();
    let (host_os, host_arch) = PlatformResolver::host();
    let host_family = OsFamily::parse(&host_os);

    for target in resolver.known_targets() {
        if filter.is_some_and(|f| f != target.os) {
            continue;
        }
        let marker = if host_family == Some(target.os) && target.arch == host_arch {
            " (host)"
        } else {
            ""
        };
        println!(
            "{:<24} {:<8} {}{}",
            target.id,
            target.os.as_str(),
            target.arch,
            marker
        );
    }

    Ok(())
}
