//! Probed media description and inspector output parsing

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::model::StreamRole;
use crate::error::{GatewayError, GatewayResult};

/// Default number of source bytes sampled before probing
pub const DEFAULT_PROBE_BYTES: u64 = 10 * 1024 * 1024;

/// Stream found by the inspector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeStream {
    /// Stream type (`audio`, `video`, `subtitle`, `data`, ...)
    pub codec_type: String,
    pub codec_name: String,
    /// Bit rate in bit/s
    pub bit_rate: Option<u64>,
    pub tags: BTreeMap<String, String>,
}

/// Container and codecs found by sampling actual bytes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbedInfo {
    /// Container format name, possibly a comma separated list (`mov,mp4,m4a`)
    pub format_name: String,
    pub streams: Vec<ProbeStream>,
    pub duration: Option<Duration>,
}

impl ProbedInfo {
    /// Codec of the first stream with the given role
    pub fn codec(&self, role: StreamRole) -> Option<&str> {
        self.streams
            .iter()
            .find(|s| StreamRole::from_codec_type(&s.codec_type) == Some(role))
            .map(|s| s.codec_name.as_str())
    }

    pub fn audio_codec(&self) -> Option<&str> {
        self.codec(StreamRole::Audio)
    }

    pub fn video_codec(&self) -> Option<&str> {
        self.codec(StreamRole::Video)
    }

    /// Individual container names
    pub fn format_names(&self) -> impl Iterator<Item = &str> {
        self.format_name.split(',').map(str::trim).filter(|s| !s.is_empty())
    }
}

// Inspector output is all strings, numbers included
#[derive(Deserialize)]
struct RawOutput {
    format: Option<RawFormat>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Deserialize)]
struct RawFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct RawStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    bit_rate: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parse the inspector's JSON output
pub fn parse_probe_output(output: &[u8]) -> GatewayResult<ProbedInfo> {
    let raw: RawOutput = serde_json::from_slice(output).map_err(|e| GatewayError::ProbeError {
        message: format!("invalid inspector output: {}", e),
    })?;

    let format = raw.format.ok_or_else(|| GatewayError::ProbeError {
        message: "inspector output has no format section".to_string(),
    })?;
    let format_name = format
        .format_name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| GatewayError::ProbeError {
            message: "inspector output has no format name".to_string(),
        })?;

    let duration = format
        .duration
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64);

    let streams = raw
        .streams
        .into_iter()
        .map(|s| ProbeStream {
            codec_type: s.codec_type.unwrap_or_default(),
            codec_name: s.codec_name.unwrap_or_default(),
            bit_rate: s.bit_rate.and_then(|b| b.parse().ok()),
            tags: s.tags,
        })
        .collect();

    Ok(ProbedInfo {
        format_name,
        streams,
        duration,
    })
}
