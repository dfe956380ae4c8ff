// Ports - Interface definitions (contracts)

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::domain::model::MediaInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::probe::ProbedInfo;
use crate::streams::ByteSource;

/// Port for the external extraction tool
#[async_trait]
pub trait ExtractorPort: Send + Sync {
    /// Resolve a media URL into its document and advertised source streams
    async fn info(&self, url: &str, cancel: &CancellationToken) -> GatewayResult<MediaInfo>;

    /// Start streaming the raw bytes of one source stream
    async fn download(
        &self,
        info: &MediaInfo,
        format_id: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<FetchedStream>;
}

/// Live source stream plus the resources behind it
pub struct FetchedStream {
    pub reader: ByteSource,
    pub handle: Box<dyn FetchHandle>,
}

/// Owner of the process and temp state behind a [`FetchedStream`]
#[async_trait]
pub trait FetchHandle: Send {
    /// Terminate the fetch if still running, wait for it and remove temp
    /// state. Calling it again does nothing.
    async fn close(&mut self) -> GatewayResult<()>;
}

/// Port for media probing
#[async_trait]
pub trait ProbePort: Send + Sync {
    /// Probe at most `max_bytes` read from `reader`
    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo>;

    /// Probe a file path or URL the inspector can open itself
    async fn probe_location(
        &self,
        location: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo>;
}

/// Port for logging and observability
#[async_trait]
pub trait LogPort: Send + Sync {
    /// Log info message
    async fn info(&self, message: &str);

    /// Log warning message
    async fn warn(&self, message: &str);

    /// Log error message
    async fn error(&self, message: &str);

    /// Log debug message
    async fn debug(&self, message: &str);
}

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse log level from string
    pub fn parse(level_str: &str) -> Result<Self, GatewayError> {
        match level_str.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(GatewayError::ConfigurationError {
                message: format!(
                    "Invalid log level: {}. Valid levels: trace, debug, info, warn, error",
                    level_str
                ),
            }),
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::parse("warn").unwrap().as_filter(), "warn");
        assert!(LogLevel::parse("loud").is_err());
    }
}
