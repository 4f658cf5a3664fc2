//! huddle terminal client entry point.
//!
//! # Usage
//!
//! ```bash
//! # Single-process simulation, no server needed
//! huddle-tui
//!
//! # Against Redis, logging to a file
//! huddle-tui --redis 127.0.0.1:6379 --name alice --log-file huddle.log
//! ```

use std::{fs::File, path::PathBuf, sync::Mutex};

use clap::Parser;
use huddle_tui::{Backend, RuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Presence-aware multi-channel chat
#[derive(Parser, Debug)]
#[command(name = "huddle-tui")]
#[command(about = "Terminal chat client with channels and friend presence")]
#[command(version)]
struct Args {
    /// Redis address (host:port)
    ///
    /// If not provided, runs in simulation mode with an in-process store.
    #[arg(short, long)]
    redis: Option<String>,

    /// User name; prompted for when absent
    #[arg(short, long)]
    name: Option<String>,

    /// Comma-separated channel list, broadcast channel first
    #[arg(long, value_delimiter = ',')]
    channels: Vec<String>,

    /// Write logs to this file (the terminal is the UI, so logs are off
    /// without it)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let log_layer = match &args.log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        },
        None => None,
    };
    tracing_subscriber::registry().with(log_layer).with(filter).init();

    let config = RuntimeConfig {
        backend: args.redis.map_or(Backend::Simulation, Backend::Redis),
        name: args.name,
        channels: args.channels,
    };

    Ok(huddle_tui::run(config).await?)
}
