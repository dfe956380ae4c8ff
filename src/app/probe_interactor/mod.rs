// Probe interactor - Orchestrates media inspection of a file or URL

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{GatewayError, GatewayResult};
use crate::ports::*;
use crate::probe::ProbedInfo;

/// Interactor for the probe use case
pub struct ProbeInteractor {
    probe_port: Arc<dyn ProbePort>,
    log_port: Arc<dyn LogPort>,
}

impl ProbeInteractor {
    /// Create new probe interactor with injected ports
    pub fn new(probe_port: Arc<dyn ProbePort>, log_port: Arc<dyn LogPort>) -> Self {
        Self {
            probe_port,
            log_port,
        }
    }

    /// Probe a local path or a URL the inspector can open
    pub async fn probe(&self, location: &str, cancel: &CancellationToken) -> GatewayResult<ProbedInfo> {
        if !location.contains("://") && !Path::new(location).exists() {
            return Err(GatewayError::ProbeError {
                message: format!("Input file does not exist: {}", location),
            });
        }

        self.log_port.info(&format!("probing {}", location)).await;
        let info = self.probe_port.probe_location(location, cancel).await?;
        self.log_port
            .info(&format!(
                "{}: {} with {} stream(s)",
                location,
                info.format_name,
                info.streams.len()
            ))
            .await;
        Ok(info)
    }

    /// Human-readable report
    pub fn summary(info: &ProbedInfo) -> String {
        let mut out = format!("format: {}", info.format_name);
        if let Some(duration) = info.duration {
            out.push_str(&format!("\nduration: {:.2}s", duration.as_secs_f64()));
        }
        for (index, stream) in info.streams.iter().enumerate() {
            out.push_str(&format!("\nstream {}: {} {}", index, stream.codec_type, stream.codec_name));
            if let Some(bit_rate) = stream.bit_rate {
                out.push_str(&format!(" {} kb/s", bit_rate / 1000));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tracing_log::NopLogAdapter;
    use crate::app::test_support::FakeProbe;

    #[tokio::test]
    async fn test_missing_file_is_rejected_before_probing() {
        let probe = ProbeInteractor::new(Arc::new(FakeProbe::failing()), Arc::new(NopLogAdapter));
        let result = probe
            .probe("/nonexistent/input.mp4", &CancellationToken::new())
            .await;
        match result {
            Err(GatewayError::ProbeError { message }) => assert!(message.contains("does not exist")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_summary() {
        let probe = ProbeInteractor::new(
            Arc::new(FakeProbe::reporting("mp3", &[("audio", "mp3")])),
            Arc::new(NopLogAdapter),
        );
        let info = probe
            .probe("https://example.com/a.mp3", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(ProbeInteractor::summary(&info), "format: mp3\nstream 0: audio mp3");
    }
}
