use super::{open_document, resolve_path};
use crate::config::Config;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use timeline_editor::EventState;

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Timeline documents to check
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn check(args: CheckArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    println!("🔍 {} timeline documents", "Checking".green().bold());
    println!();

    let mut failures = 0;
    for file in &args.files {
        let path = resolve_path(cwd, file);
        match check_file(&path, &config) {
            Ok(summary) => println!("  {} {} - {}", "✓".green(), file.display(), summary),
            Err(e) => {
                failures += 1;
                eprintln!("  {} {} - {}", "✗".red(), file.display(), format!("{:#}", e).red());
            }
        }
    }

    println!();
    if failures > 0 {
        return Err(anyhow!("{} of {} documents failed", failures, args.files.len()));
    }
    println!("✨ {} {} documents OK", "Done".green().bold(), args.files.len());
    Ok(())
}

fn check_file(path: &std::path::Path, config: &Config) -> Result<String> {
    let doc = open_document(path, config)?;
    let listing = doc.events().list_events()?;
    let count = |state: EventState| listing.events.iter().filter(|e| e.state == state).count();
    let settings = doc.settings().get();
    Ok(format!(
        "{} elements, {} templates, {} queued, {} active, player {}",
        doc.element_count(),
        count(EventState::Abstract),
        count(EventState::Ready),
        count(EventState::Active),
        settings.player_mode
    ))
}
