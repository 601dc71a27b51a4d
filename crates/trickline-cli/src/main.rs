//! Trickline CLI - Headless timeline inspector and buffer driver
//!
//! Features:
//! - Timeline inspection (positions, segment resolution, staleness)
//! - Seeking a buffer engine against an HTTP or local segment source

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Trickline CLI - Trick-play buffer toolkit
#[derive(Parser)]
#[command(name = "trickline-cli")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Inspect segment timelines and drive a bounded buffer engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect a track description
    Inspect {
        /// Path to the track JSON
        track: PathBuf,

        /// Resolve the segments near this position (repeatable)
        #[arg(long = "at")]
        at: Vec<f64>,
    },

    /// Buffer a sequence of positions
    Seek {
        /// Path to the track JSON
        track: PathBuf,

        /// Base URL or directory segments are fetched from
        #[arg(short, long)]
        base: String,

        /// Positions to seek to, in order
        #[arg(required = true)]
        times: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .init();

    trickline_core::init();

    match cli.command {
        Commands::Inspect { track, at } => {
            commands::inspect(&track, &at, &cli.format).await?;
        }
        Commands::Seek { track, base, times } => {
            let config = commands::load_config(cli.config.as_deref()).await?;
            commands::seek(&track, &base, &times, config, &cli.format).await?;
        }
    }

    Ok(())
}
