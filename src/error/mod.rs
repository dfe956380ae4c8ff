//! Error handling module for mediagate

use thiserror::Error;

use crate::domain::model::StreamRole;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed target-format catalog or settings (load time only)
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Requested target format is not in the catalog
    #[error("Unknown format: {name}")]
    NoSuchFormat { name: String },

    /// No source stream satisfies a required role
    #[error("No {role} stream available")]
    NoSuchStream { role: StreamRole },

    /// Other negotiation failures
    #[error("Negotiation failed: {message}")]
    NegotiationError { message: String },

    /// Extraction tool failure
    #[error("Fetch failed: {message}")]
    FetchError { message: String },

    /// Inspection tool failure
    #[error("Probe failed: {message}")]
    ProbeError { message: String },

    /// Pipe allocation or process spawn failure
    #[error("Pipeline setup failed: {message}")]
    PipelineError { message: String },

    /// Failure after bytes started flowing
    #[error("Streaming failed: {message}")]
    StreamingError { message: String },

    /// The request cancellation signal fired
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
