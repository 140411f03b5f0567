//! attsync CLI
//!
//! Runs the attendance sync engine.
//!
//! # Commands
//!
//! - `pull` - Run one pull cycle over every enabled source
//! - `run` - Pull on the configured schedule and serve pushing devices
//! - `serve` - Serve pushing devices only
//! - `probe` - Open one device session and report what it returned
//! - `checkpoint` - Show or reset source checkpoints

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Attendance event sync engine.
#[derive(Parser)]
#[command(name = "attsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(global = true, short, long, default_value = "attsync.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Keep events in memory instead of writing to the sink
    #[arg(global = true, long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pull cycle over every enabled source
    Pull,

    /// Pull on the configured schedule and serve pushing devices
    Run,

    /// Serve pushing devices only
    Serve,

    /// Open one device session and report what it returned
    Probe {
        /// Device host or IP
        host: String,

        /// Device port
        #[arg(short, long, default_value = "5005")]
        port: u16,

        /// Number of decoded records to print
        #[arg(short, long, default_value = "10")]
        show: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show or reset source checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the last committed position of one or all sources
    Show {
        /// Source id
        source: Option<String>,
    },

    /// Forget a source's position so its next cycle reads full history
    Reset {
        /// Source id
        source: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Pull => commands::pull::run(&cli.config, cli.dry_run)?,
        Commands::Run => commands::daemon::run(&cli.config, cli.dry_run)?,
        Commands::Serve => commands::daemon::serve(&cli.config, cli.dry_run)?,
        Commands::Probe {
            host,
            port,
            show,
            format,
        } => commands::probe::run(&cli.config, &host, port, show, &format)?,
        Commands::Checkpoint { action } => match action {
            CheckpointAction::Show { source } => {
                commands::checkpoint::show(&cli.config, source.as_deref())?
            }
            CheckpointAction::Reset { source } => {
                commands::checkpoint::reset(&cli.config, &source)?
            }
        },
        Commands::Version => {
            println!("attsync v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
