//! spendsync CLI
//!
//! Command-line client for the offline-first expense buffer.
//!
//! # Commands
//!
//! - `add` - Record an expense locally and push it when online
//! - `list` - Show local records, pending ones first
//! - `pending` - Show queued intents and dead letters
//! - `sync` - Push pending writes, then refresh from the server
//! - `watch` - Keep draining on an interval until interrupted
//! - `retry` / `discard` - Resolve a dead-lettered intent
//! - `categories` - Show cached categories

mod client;
mod commands;

use clap::{Parser, Subcommand};
use commands::{Format, Settings};
use spendsync_core::TempId;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Offline-first expense recording.
#[derive(Parser)]
#[command(name = "spendsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the local store and queue
    #[arg(global = true, short, long, env = "SPENDSYNC_DATA_DIR", default_value = ".spendsync")]
    data_dir: PathBuf,

    /// Base URL of the expense API
    #[arg(
        global = true,
        long,
        env = "SPENDSYNC_API_URL",
        default_value = "http://127.0.0.1:8000"
    )]
    api_url: String,

    /// Bearer token for the API
    #[arg(global = true, long, env = "SPENDSYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Treat the device as offline: record locally, never contact the API
    #[arg(global = true, long, env = "SPENDSYNC_OFFLINE")]
    offline: bool,

    /// Per-request timeout in seconds
    #[arg(global = true, long, default_value = "30")]
    timeout: u64,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an expense
    Add(commands::add::AddArgs),

    /// Show local records
    List {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show queued intents and dead letters
    Pending {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Push pending writes, then refresh categories and records
    Sync,

    /// Drain the queue on an interval until interrupted
    Watch {
        /// Seconds between drains
        #[arg(short, long, default_value = "60")]
        interval: u64,
    },

    /// Move a dead-lettered intent back into the queue
    Retry {
        /// Temporary id (e.g. tmp-3)
        temp_id: TempId,
    },

    /// Drop a dead-lettered intent and its pending record
    Discard {
        /// Temporary id (e.g. tmp-3)
        temp_id: TempId,
    },

    /// Show cached categories
    Categories {
        /// Output format (text, json)
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over -v.
    let default = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings {
        data_dir: cli.data_dir,
        api_url: cli.api_url,
        token: cli.token,
        offline: cli.offline,
        timeout: Duration::from_secs(cli.timeout),
    };

    match cli.command {
        Commands::Add(args) => commands::add::run(&settings, args).await?,
        Commands::List { format } => commands::list::records(&settings, format)?,
        Commands::Pending { format } => commands::pending::show(&settings, format)?,
        Commands::Sync => commands::sync::run(&settings).await?,
        Commands::Watch { interval } => {
            commands::sync::watch(&settings, Duration::from_secs(interval.max(1))).await?
        }
        Commands::Retry { temp_id } => commands::pending::retry(&settings, temp_id)?,
        Commands::Discard { temp_id } => commands::pending::discard(&settings, temp_id)?,
        Commands::Categories { format } => commands::list::categories(&settings, format)?,
        Commands::Version => {
            println!("spendsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("store format v{}", spendsync_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
