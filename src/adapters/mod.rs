// Adapters - External system implementations

pub mod extract_ytdlp;
pub mod probe_ffprobe;
pub mod toml_config;
pub mod tracing_log;

// Re-export adapters
pub use extract_ytdlp::YtDlpAdapter;
pub use probe_ffprobe::FfprobeAdapter;
pub use toml_config::{default_catalog, load_catalog, load_settings, SettingsFile};
pub use tracing_log::{NopLogAdapter, TracingLogAdapter};
