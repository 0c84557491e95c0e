//! failcheck CLI
//!
//! Drives a failover data-loss test against PostgreSQL.
//!
//! # Commands
//!
//! - `init` - Create the remote schema
//! - `load` - Write records locally and remotely until interrupted
//! - `compare` - List records the remote store lost

mod commands;

use clap::{Parser, Subcommand};
use failcheck_core::{parse_duration, DEFAULT_LOG_PATH};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Failover data-loss tester.
#[derive(Parser)]
#[command(name = "failcheck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// PostgreSQL connection URL
    #[arg(global = true, short, long, env = "FAILCHECK_DB_URL")]
    db_url: Option<String>,

    /// Path to the local log
    #[arg(global = true, short, long, default_value = DEFAULT_LOG_PATH)]
    store: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the remote schema and tables
    Init {
        /// Connection and DDL timeout
        #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
        timeout: Duration,
    },

    /// Generate records until interrupted
    Load {
        /// Timeout for each remote operation
        #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
        timeout: Duration,

        /// Pause between cycles
        #[arg(short, long, default_value = "500ms", value_parser = parse_duration)]
        pause: Duration,

        /// Start over: empty the local log and the remote tables
        #[arg(short = 'T', long)]
        truncate: bool,

        /// Payload size in bytes
        #[arg(short = 'S', long, default_value_t = 10, allow_negative_numbers = true)]
        size: i64,

        /// Skip the fsync after each local append
        #[arg(long)]
        no_sync: bool,
    },

    /// Compare the local log with the remote store
    Compare {
        /// Reuse the comparison table already loaded
        #[arg(short, long)]
        no_load: bool,

        /// Timeout for each remote operation
        #[arg(short, long, default_value = "5s", value_parser = parse_duration)]
        timeout: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let url = cli
        .db_url
        .ok_or("database URL required (--db-url or FAILCHECK_DB_URL)")?;

    match cli.command {
        Commands::Init { timeout } => {
            commands::init::run(&url, timeout).await?;
        }
        Commands::Load {
            timeout,
            pause,
            truncate,
            size,
            no_sync,
        } => {
            let config = failcheck_core::GeneratorConfig::new(cli.store)
                .with_timeout(timeout)
                .with_pause(pause)
                .with_reset(truncate)
                .with_payload_size(size)
                .with_sync_on_write(!no_sync);
            commands::load::run(&url, config).await?;
        }
        Commands::Compare { no_load, timeout } => {
            let config = failcheck_core::ReconcileConfig::new(cli.store)
                .with_timeout(timeout)
                .with_no_load(no_load);
            commands::compare::run(&url, config).await?;
        }
    }

    Ok(())
}
