use super::{open_document, resolve_path};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    /// Timeline document
    pub file: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Load and save a document, dropping runtime bookkeeping
pub fn normalize(args: NormalizeArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let doc = open_document(&resolve_path(cwd, &args.file), &config)?;

    match args.output {
        Some(output) => {
            let output = resolve_path(cwd, &output);
            doc.save(&output.display().to_string())?;
            eprintln!("{} Wrote {}", "✓".green(), output.display());
        }
        None => println!("{}", doc.to_xml()?),
    }
    Ok(())
}
