//! Somnus CLI - Sleep Companion
//!
//! Command-line interface for the session timer, sleep history and soundscapes.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::info;

use somnus::cli::commands;
use somnus::cli::{Cli, Commands, HistoryAction};
use somnus::SomnusConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    info!("Somnus v{}", env!("CARGO_PKG_VERSION"));

    let config = SomnusConfig::load_or_default(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("Failed to load config from {}", path.display()),
            None => "Failed to build default config".to_string(),
        }
    })?;
    let store_path = cli.store.clone().unwrap_or_else(|| config.store_path.clone());

    let result = match cli.command {
        Some(Commands::Timer { log }) => commands::run_timer(&config, &store_path, log),
        Some(Commands::History { action }) => match action {
            HistoryAction::List => commands::history_list(&store_path),
            HistoryAction::Add { date, hours } => {
                commands::history_add(&store_path, &date, &hours)
            }
            HistoryAction::Clear => commands::history_clear(&store_path),
        },
        Some(Commands::Render {
            kind,
            seconds,
            volume,
            output,
            bit_depth,
        }) => commands::render(&config, &kind, seconds, volume, &output, bit_depth),
        Some(Commands::Session) | None => commands::run_session(&config, &store_path),
    };

    if let Err(e) = &result {
        if e.is_recoverable() {
            commands::print_error(e);
            std::process::exit(2);
        }
    }
    result.context("somnus-cli failed")
}
