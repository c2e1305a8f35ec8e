//! `mooring completions` command

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::generate;

use crate::cli::{Cli, CompletionsArgs};
use mooring::util::fs::write_all_atomic;

pub fn execute(args: CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    let mut script = Vec::new();
    generate(args.shell, &mut cmd, "mooring", &mut script);

    match args.output {
        Some(path) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| format!("mooring.{}", args.shell));
            let dir = match path.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => std::env::current_dir()?,
            };
            write_all_atomic(&dir, &[(name, script)])?;
            eprintln!("wrote {} completions to {}", args.shell, path.display());
        }
        None => print!("{}", String::from_utf8_lossy(&script)),
    }

    Ok(())
}
