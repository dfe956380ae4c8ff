//! Configuration initialization and hierarchy management
//!
//! Precedence: CLI > Env > File > Defaults

use std::path::{Path, PathBuf};

use crate::adapters::{load_settings, SettingsFile};
use crate::cli::Cli;
use crate::error::{GatewayError, GatewayResult};
use crate::ports::LogLevel;
use crate::probe::DEFAULT_PROBE_BYTES;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "mediagate.toml";

/// Resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ytdlp: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub probe_bytes: u64,
    /// Catalog file replacing the built-in one
    pub catalog: Option<PathBuf>,
    pub log_level: LogLevel,
    /// File the file layer came from, if any
    pub config_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            probe_bytes: DEFAULT_PROBE_BYTES,
            catalog: None,
            log_level: LogLevel::Info,
            config_file: None,
        }
    }
}

fn program(key: &str, value: String) -> GatewayResult<String> {
    if value.trim().is_empty() {
        return Err(GatewayError::ConfigurationError {
            message: format!("{} must not be empty", key),
        });
    }
    Ok(value)
}

fn probe_bytes(value: u64) -> GatewayResult<u64> {
    if value == 0 {
        return Err(GatewayError::ConfigurationError {
            message: "probe_bytes must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

impl Settings {
    /// Apply the values present in a config file
    pub fn apply_file(&mut self, file: SettingsFile) -> GatewayResult<()> {
        if let Some(value) = file.ytdlp {
            self.ytdlp = program("ytdlp", value)?;
        }
        if let Some(value) = file.ffmpeg {
            self.ffmpeg = program("ffmpeg", value)?;
        }
        if let Some(value) = file.ffprobe {
            self.ffprobe = program("ffprobe", value)?;
        }
        if let Some(value) = file.probe_bytes {
            self.probe_bytes = probe_bytes(value)?;
        }
        if let Some(value) = file.catalog {
            self.catalog = Some(value);
        }
        if let Some(value) = file.log_level {
            self.log_level = LogLevel::parse(&value)?;
        }
        Ok(())
    }

    /// Apply `MEDIAGATE_*` variables found through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("MEDIAGATE_YTDLP") {
            self.ytdlp = program("MEDIAGATE_YTDLP", value)?;
        }
        if let Some(value) = lookup("MEDIAGATE_FFMPEG") {
            self.ffmpeg = program("MEDIAGATE_FFMPEG", value)?;
        }
        if let Some(value) = lookup("MEDIAGATE_FFPROBE") {
            self.ffprobe = program("MEDIAGATE_FFPROBE", value)?;
        }
        if let Some(value) = lookup("MEDIAGATE_PROBE_BYTES") {
            let parsed = value.trim().parse().map_err(|e| GatewayError::ConfigurationError {
                message: format!("Invalid MEDIAGATE_PROBE_BYTES {:?}: {}", value, e),
            })?;
            self.probe_bytes = probe_bytes(parsed)?;
        }
        if let Some(value) = lookup("MEDIAGATE_CATALOG") {
            self.catalog = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("MEDIAGATE_LOG_LEVEL") {
            self.log_level = LogLevel::parse(&value)?;
        }
        Ok(())
    }
}

/// Resolve settings from every layer. `config` is an explicit config file,
/// which must exist; without it `mediagate.toml` is used when present.
pub fn resolve_settings<F>(
    config: Option<&Path>,
    lookup: F,
    log_level: Option<&str>,
) -> GatewayResult<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    let file = match config {
        Some(path) => Some(path.to_path_buf()),
        None => Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()),
    };
    if let Some(path) = file {
        settings.apply_file(load_settings(&path)?)?;
        settings.config_file = Some(path);
    }

    settings.apply_env(lookup)?;

    if let Some(level) = log_level {
        settings.log_level = LogLevel::parse(level)?;
    }
    Ok(settings)
}

/// Settings for this process: CLI flags over the real environment
pub fn initialize_settings(cli: &Cli) -> GatewayResult<Settings> {
    resolve_settings(
        cli.config.as_deref(),
        |key| std::env::var(key).ok(),
        cli.log_level.as_deref(),
    )
}
