//! CLI module for mediagate
//!
//! This module handles command-line argument parsing and command execution.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod args;
pub mod commands;

/// mediagate media-retrieval gateway
///
/// Fetches remote media through yt-dlp and delivers it as is or converted
/// on the fly by ffmpeg into a target format.
#[derive(Parser, Debug)]
#[command(name = "mediagate")]
#[command(about = "mediagate - fetch and convert remote media on the fly")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Settings file (default: mediagate.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download a media URL, optionally converting it
    Fetch(args::FetchArgs),
    /// List the configured target formats
    Formats(args::FormatsArgs),
    /// Inspect a media file or URL
    Probe(args::ProbeArgs),
}
