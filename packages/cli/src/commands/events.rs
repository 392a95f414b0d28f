use super::{open_document, resolve_path};
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use timeline_editor::{EventDescription, EventState};

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// Timeline document
    pub file: PathBuf,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn events(args: EventsArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let doc = open_document(&resolve_path(cwd, &args.file), &config)?;
    let listing = doc.events().list_events()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{}", doc.description().bright_blue().bold());
    if let Some(status) = &listing.remote.status {
        println!("{}", status.dimmed());
    }
    println!();

    if listing.events.is_empty() {
        println!("{}", "⚠️  No events in document".yellow());
        return Ok(());
    }
    for event in &listing.events {
        print_event(event);
    }
    Ok(())
}

fn print_event(event: &EventDescription) {
    let state = match event.state {
        EventState::Abstract => "template".cyan(),
        EventState::Ready => "queued".yellow(),
        EventState::Active => "active".green(),
    };
    println!(
        "  {:>8}  {}  {}",
        state,
        event.id.as_deref().unwrap_or("-").bold(),
        event.name.as_deref().unwrap_or("")
    );
    for parameter in &event.parameters {
        let required = if parameter.required { "*" } else { "" };
        println!(
            "            {}{} = {}",
            parameter.name.as_deref().unwrap_or(&parameter.parameter),
            required.red(),
            parameter.value.as_deref().unwrap_or("").dimmed()
        );
    }
}
