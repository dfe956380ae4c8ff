//! mediagate CLI
//!
//! Fetches remote media and delivers it as is or converted on the fly into
//! one of the configured target formats.
//!
//! # Usage
//!
//! ```bash
//! mediagate fetch "https://example.com/watch?v=abc" -f mp3
//! mediagate fetch "https://example.com/watch?v=abc" -f webm -c vp9 -o - > clip.webm
//! mediagate formats
//! mediagate probe clip.webm
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mediagate::app::container::DefaultAppContainer;
use mediagate::cli::{commands, Cli, Commands};
use mediagate::config_initialization::{initialize_settings, Settings};

/// Main entry point for the mediagate CLI application
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = initialize_settings(&cli).context("Invalid configuration")?;

    init_logging(&settings, cli.log_json);
    if let Some(path) = &settings.config_file {
        info!("Loaded settings from {}", path.display());
    }

    let container = DefaultAppContainer::new(&settings).context("Failed to load the format catalog")?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            interrupt.cancel();
        }
    });

    match cli.command {
        Commands::Fetch(args) => commands::fetch(&container, args, cancel).await,
        Commands::Formats(args) => commands::formats(&container, args),
        Commands::Probe(args) => commands::probe(&container, args, cancel).await,
    }
}

/// Logs go to stderr; stdout may carry media
fn init_logging(settings: &Settings, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.log_level.as_filter()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
