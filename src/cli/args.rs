//! Command-line argument definitions

use std::path::PathBuf;

use clap::Args;

/// Arguments for the fetch command
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Media page or stream URL
    pub url: String,

    /// Target format name (see `mediagate formats`); omit for the best source as is
    #[arg(short, long)]
    pub format: Option<String>,

    /// Codec to prefer, repeatable; ignored where the target does not allow it
    #[arg(short = 'c', long = "codec")]
    pub codecs: Vec<String>,

    /// Encode even when the source already has the target codec
    #[arg(long)]
    pub retranscode: bool,

    /// Output file path, `-` for stdout (default: derived from the title)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the formats command
#[derive(Args, Debug)]
pub struct FormatsArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the probe command
#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Media file path or URL
    pub input: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
