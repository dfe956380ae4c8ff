//! mediagate media-retrieval gateway library
//!
//! Fetches remote media through an extraction tool, inspects it with a
//! replayable prefix and delivers it either as is or converted on the fly
//! by an external encoder fed over inherited pipe descriptors.

#[cfg(not(unix))]
compile_error!("mediagate hands pipe descriptors to child processes and requires a unix target");

pub mod adapters;
pub mod app;
pub mod cli;
pub mod config_initialization;
pub mod domain;
pub mod engine;
pub mod error;
pub mod output;
pub mod ports;
pub mod probe;
pub mod streams;

// Re-export commonly used types
pub use app::{DownloadInteractor, DownloadOptions, DownloadResult};
pub use domain::model::{FormatCatalog, MediaInfo, Metadata, StreamRole, TargetFormat};
pub use domain::priority::PrioritySet;
pub use engine::{Pipeline, ProcessSession};
pub use error::{GatewayError, GatewayResult};
pub use probe::ProbedInfo;
pub use streams::ReplayReader;
