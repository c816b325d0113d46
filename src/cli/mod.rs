//! CLI Module
//!
//! Command-line interface for the Somnus sleep companion.

pub mod commands;
pub mod session;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Longest offline render accepted from the command line (one hour)
pub const MAX_RENDER_SECONDS: f32 = 3600.0;

/// Somnus - sleep timer, sleep log and ambient soundscapes
#[derive(Parser, Debug)]
#[command(name = "somnus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Key-value store file holding the sleep history (overrides the config)
    #[arg(short, long, global = true)]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Time a sleep session; press Enter to stop
    #[command(name = "timer")]
    Timer {
        /// Append the finished session to today's history
        #[arg(short, long)]
        log: bool,
    },

    /// Show or edit the sleep history
    #[command(name = "history")]
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Render a soundscape to a WAV file
    #[command(name = "render")]
    Render {
        /// Sound to render: white, rain or ocean
        kind: String,

        /// Length in seconds, at most one hour
        #[arg(long, default_value_t = 10.0)]
        seconds: f32,

        /// Master volume, 0-100 (defaults to the configured volume)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
        volume: Option<u32>,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Sample bit depth: 16, 24 or 32 (float)
        #[arg(long, default_value_t = 16)]
        bit_depth: u16,
    },

    /// Interactive session with the timer, history and soundscapes
    #[command(name = "session")]
    Session,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Print every entry, newest first
    List,

    /// Log a night
    Add {
        /// Date as YYYY-MM-DD
        #[arg(short, long)]
        date: String,

        /// Hours slept
        #[arg(long)]
        hours: String,
    },

    /// Delete the whole history
    Clear,
}
