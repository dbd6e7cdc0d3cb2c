//! Forager CLI - adaptive profiling sampler.
//!
//! Commands:
//! - `forager check` - Show the sampling policy a site would run with
//! - `forager simulate` - Replay request keys through a live sampler

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "forager")]
#[command(about = "Adaptive per-request profiling sampler")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the agent configuration and show a site's policy
    Check {
        /// Path to the agent configuration file
        #[arg(short, long, env = "FORAGER_SETTINGS", default_value_os_t = forager_refresh::default_settings_path())]
        settings: PathBuf,

        /// Site identifier to read settings for
        #[arg(long, env = "FORAGER_SITE")]
        site: String,

        /// Output format (text or json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Request URLs to resolve against the policy
        keys: Vec<String>,
    },

    /// Replay a file of request URLs through a sampler kept fresh by the refresher
    Simulate {
        /// Path to the agent configuration file
        #[arg(short, long, env = "FORAGER_SETTINGS", default_value_os_t = forager_refresh::default_settings_path())]
        settings: PathBuf,

        /// Site identifier to read settings for
        #[arg(long, env = "FORAGER_SITE")]
        site: String,

        /// File with one request URL per line
        #[arg(short, long)]
        requests: PathBuf,

        /// Seconds between configuration polls
        #[arg(long, default_value_t = 300)]
        poll_interval_secs: u64,

        /// Number of times to replay the request file
        #[arg(long, default_value_t = 1)]
        rounds: usize,

        /// Pause between requests in milliseconds
        #[arg(long, default_value_t = 0)]
        pace_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG takes precedence over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Check {
            settings,
            site,
            format,
            keys,
        } => commands::check::run(&settings, &site, &format, &keys),
        Commands::Simulate {
            settings,
            site,
            requests,
            poll_interval_secs,
            rounds,
            pace_ms,
        } => {
            let options = commands::simulate::SimulateOptions {
                settings,
                site,
                requests,
                poll_interval_secs,
                rounds,
                pace_ms,
            };
            commands::simulate::run(options).await
        }
    }
}
