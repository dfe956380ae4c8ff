//! FFprobe adapter for media probing
//!
//! Runs `ffprobe` on a bounded prefix of a live stream (fed through stdin) or
//! on a location ffprobe opens itself, and parses its JSON report.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::adapters::tracing_log::NopLogAdapter;
use crate::error::{GatewayError, GatewayResult};
use crate::ports::*;
use crate::probe::{parse_probe_output, ProbedInfo};

/// FFprobe-based probe adapter
pub struct FfprobeAdapter {
    program: String,
    leading_args: Vec<String>,
    log: Arc<dyn LogPort>,
}

impl FfprobeAdapter {
    /// Create new FFprobe adapter running `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![],
            log: Arc::new(NopLogAdapter),
        }
    }

    /// Arguments placed before the generated ones
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogPort>) -> Self {
        self.log = log;
        self
    }

    fn spawn(&self, input: &str, stdin: Stdio) -> GatewayResult<Child> {
        Command::new(&self.program)
            .args(&self.leading_args)
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-show_format",
                "-show_streams",
                "-print_format",
                "json",
                "-i",
                input,
            ])
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GatewayError::ProbeError {
                message: format!("failed to start {}: {}", self.program, e),
            })
    }

    async fn finish(
        &self,
        status: io::Result<ExitStatus>,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
    ) -> GatewayResult<ProbedInfo> {
        let status = status.map_err(|e| GatewayError::ProbeError {
            message: format!("failed to wait for {}: {}", self.program, e),
        })?;

        let stderr = String::from_utf8_lossy(&stderr);
        for line in stderr.lines() {
            self.log.debug(&format!("{}: {}", self.program, line)).await;
        }

        if !status.success() {
            return Err(GatewayError::ProbeError {
                message: format!("{} exited with {}: {}", self.program, status, stderr.trim()),
            });
        }
        parse_probe_output(&stdout)
    }
}

async fn read_all(pipe: Option<impl AsyncRead + Unpin>) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}

fn capture_error(e: io::Error) -> GatewayError {
    GatewayError::ProbeError {
        message: format!("failed to read probe output: {}", e),
    }
}

#[async_trait]
impl ProbePort for FfprobeAdapter {
    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo> {
        let mut child = self.spawn("pipe:0", Stdio::piped())?;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let feed = async {
                let Some(mut stdin) = stdin else {
                    return Ok(());
                };
                let mut limited = reader.take(max_bytes);
                match tokio::io::copy(&mut limited, &mut stdin).await {
                    Ok(_) => Ok(()),
                    // ffprobe stops reading once it has seen enough
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                    Err(e) => Err(GatewayError::ProbeError {
                        message: format!("failed to feed probe input: {}", e),
                    }),
                }
            };
            let (fed, out, err) = tokio::join!(feed, read_all(stdout), read_all(stderr));
            let status = child.wait().await;
            fed?;
            self.finish(status, out.map_err(capture_error)?, err.map_err(capture_error)?)
                .await
        };

        let outcome = tokio::select! {
            result = run => Some(result),
            _ = cancel.cancelled() => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                let _ = child.kill().await;
                Err(GatewayError::Cancelled)
            }
        }
    }

    async fn probe_location(
        &self,
        location: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo> {
        let mut child = self.spawn(location, Stdio::null())?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let run = async {
            let (out, err) = tokio::join!(read_all(stdout), read_all(stderr));
            let status = child.wait().await;
            self.finish(status, out.map_err(capture_error)?, err.map_err(capture_error)?)
                .await
        };

        let outcome = tokio::select! {
            result = run => Some(result),
            _ = cancel.cancelled() => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                let _ = child.kill().await;
                Err(GatewayError::Cancelled)
            }
        }
    }
}
