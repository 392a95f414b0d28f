mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, enqueue, events, normalize, trigger, CheckArgs, EventsArgs, NormalizeArgs, TriggerArgs};
use config::Config;
use tracing_subscriber::EnvFilter;

/// Timeline CLI - drive live trigger documents from the shell
#[derive(Parser, Debug)]
#[command(name = "timeline")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the events of a document
    Events(EventsArgs),

    /// Instantiate an event template
    Trigger(TriggerArgs),

    /// Instantiate an event template without starting it
    Enqueue(TriggerArgs),

    /// Load documents and report what they contain
    Check(CheckArgs),

    /// Write a document without runtime bookkeeping
    Normalize(NormalizeArgs),
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn fail(err: anyhow::Error) -> ! {
    eprintln!();
    eprintln!("{} {:#}", "Error:".red().bold(), err);
    eprintln!();
    std::process::exit(1);
}

fn main() {
    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(e) => fail(anyhow::anyhow!("Cannot get current directory: {}", e)),
    };

    match Config::load(&cwd) {
        Ok(config) => init_tracing(&config),
        Err(e) => fail(e.context(config::DEFAULT_CONFIG_NAME)),
    }

    let result = match cli.command {
        Command::Events(args) => events(args, &cwd),
        Command::Trigger(args) => trigger(args, &cwd),
        Command::Enqueue(args) => enqueue(args, &cwd),
        Command::Check(args) => check(args, &cwd),
        Command::Normalize(args) => normalize(args, &cwd),
    };

    if let Err(err) = result {
        fail(err);
    }
}
