//! yt-dlp extraction adapter
//!
//! Resolves a media URL into its JSON document and streams one format of it
//! to stdout. Downloads reuse the resolved document through
//! `--load-info-json`, so the remote page is only analyzed once.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::tracing_log::NopLogAdapter;
use crate::domain::model::MediaInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::ports::*;

/// Stderr lines kept for failure messages
const STDERR_TAIL_LINES: usize = 8;

/// Time a download that closed its stdout gets to exit on its own
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// yt-dlp based extractor
pub struct YtDlpAdapter {
    program: String,
    leading_args: Vec<String>,
    log: Arc<dyn LogPort>,
}

impl YtDlpAdapter {
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

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.leading_args).kill_on_drop(true);
        command
    }

    fn fetch_error(&self, what: &str, e: impl std::fmt::Display) -> GatewayError {
        GatewayError::FetchError {
            message: format!("{} {}: {}", what, self.program, e),
        }
    }
}

#[async_trait]
impl ExtractorPort for YtDlpAdapter {
    async fn info(&self, url: &str, cancel: &CancellationToken) -> GatewayResult<MediaInfo> {
        let mut child = self
            .command()
            .args([
                "--no-playlist",
                "--no-call-home",
                "--ignore-config",
                "-J",
                "--batch-file",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.fetch_error("failed to start", e))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let batch = format!("{}\n", url);

        let run = async {
            let feed = async {
                if let Some(mut stdin) = stdin {
                    stdin.write_all(batch.as_bytes()).await?;
                    stdin.shutdown().await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let read_out = async {
                let mut buffer = Vec::new();
                if let Some(mut stdout) = stdout {
                    stdout.read_to_end(&mut buffer).await?;
                }
                Ok::<_, std::io::Error>(buffer)
            };
            let read_err = async {
                let mut buffer = Vec::new();
                if let Some(mut stderr) = stderr {
                    stderr.read_to_end(&mut buffer).await?;
                }
                Ok::<_, std::io::Error>(buffer)
            };
            let (fed, out, err) = tokio::join!(feed, read_out, read_err);
            let status = child.wait().await;
            (fed, out, err, status)
        };

        let outcome = tokio::select! {
            outcome = run => Some(outcome),
            _ = cancel.cancelled() => None,
        };
        let Some((fed, out, err, status)) = outcome else {
            let _ = child.kill().await;
            return Err(GatewayError::Cancelled);
        };

        let status = status.map_err(|e| self.fetch_error("failed to wait for", e))?;
        let err = err.map_err(|e| self.fetch_error("failed to read stderr of", e))?;
        let err = String::from_utf8_lossy(&err);
        for line in err.lines() {
            self.log.debug(&format!("{}: {}", self.program, line)).await;
        }
        if !status.success() {
            return Err(GatewayError::FetchError {
                message: format!("{} exited with {}: {}", self.program, status, err.trim()),
            });
        }
        fed.map_err(|e| self.fetch_error("failed to send the URL to", e))?;
        let out = out.map_err(|e| self.fetch_error("failed to read output of", e))?;

        let document: serde_json::Value = serde_json::from_slice(&out)
            .map_err(|e| self.fetch_error("invalid document from", e))?;
        let info =
            MediaInfo::from_document(document).map_err(|e| self.fetch_error("invalid document from", e))?;

        self.log
            .info(&format!(
                "resolved {} ({}) with {} formats",
                info.id,
                info.title,
                info.formats.len()
            ))
            .await;
        Ok(info)
    }

    async fn download(
        &self,
        info: &MediaInfo,
        format_id: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<FetchedStream> {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled);
        }

        let document = serde_json::to_vec(&info.raw)
            .map_err(|e| self.fetch_error("failed to serialize document for", e))?;
        let temp = NamedTempFile::new().map_err(|e| self.fetch_error("no temp file for", e))?;
        tokio::fs::write(temp.path(), &document)
            .await
            .map_err(|e| self.fetch_error("failed to save document for", e))?;

        let mut child = self
            .command()
            .arg("--ignore-config")
            .arg("--load-info-json")
            .arg(temp.path())
            .args(["-f", format_id, "-o", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.fetch_error("failed to start", e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.fetch_error("no stdout from", format_id))?;
        let stderr = child.stderr.take().map(|stderr| {
            let log = self.log.clone();
            let prefix = format!("{} [{}]", self.program, format_id);
            tokio::spawn(async move {
                let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.debug(&format!("{}: {}", prefix, line)).await;
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                tail.into_iter().collect::<Vec<_>>()
            })
        });

        self.log
            .debug(&format!("downloading format {} of {}", format_id, info.id))
            .await;

        Ok(FetchedStream {
            reader: Box::new(stdout),
            handle: Box::new(YtDlpFetch {
                label: format!("{} [{}]", self.program, format_id),
                child: Some(child),
                stderr,
                temp: Some(temp),
                cancel: cancel.clone(),
                log: self.log.clone(),
            }),
        })
    }
}

/// Process and saved document behind one download
struct YtDlpFetch {
    label: String,
    child: Option<Child>,
    stderr: Option<JoinHandle<Vec<String>>>,
    temp: Option<NamedTempFile>,
    cancel: CancellationToken,
    log: Arc<dyn LogPort>,
}

impl YtDlpFetch {
    /// Exit status if the process ended by itself, `None` if it was killed
    async fn stop(&mut self, mut child: Child) -> Option<ExitStatus> {
        let mut status = child.try_wait().ok().flatten();
        if status.is_none() && !self.cancel.is_cancelled() {
            status = tokio::time::timeout(EXIT_GRACE, child.wait())
                .await
                .ok()
                .and_then(Result::ok);
        }
        if status.is_some() {
            return status;
        }

        let _ = child.start_kill();
        // Helpers the extractor spawned may still hold stderr open
        if let Some(task) = self.stderr.take() {
            task.abort();
        }
        if let Err(e) = child.wait().await {
            self.log
                .warn(&format!("failed to reap {}: {}", self.label, e))
                .await;
        }
        None
    }

    async fn stderr_tail(&mut self) -> Vec<String> {
        let Some(mut task) = self.stderr.take() else {
            return vec![];
        };
        match tokio::time::timeout(EXIT_GRACE, &mut task).await {
            Ok(tail) => tail.unwrap_or_default(),
            Err(_) => {
                task.abort();
                vec![]
            }
        }
    }
}

#[async_trait]
impl FetchHandle for YtDlpFetch {
    /// A download that failed by itself is a streaming error: its consumer
    /// got a truncated stream. Kills done here or after cancellation are not.
    async fn close(&mut self) -> GatewayResult<()> {
        let mut result = Ok(());
        if let Some(child) = self.child.take() {
            if let Some(status) = self.stop(child).await {
                let tail = self.stderr_tail().await;
                if !status.success() && !self.cancel.is_cancelled() {
                    let mut message = format!("{} exited with {}", self.label, status);
                    if !tail.is_empty() {
                        message.push_str(": ");
                        message.push_str(&tail.join("; "));
                    }
                    self.log.warn(&message).await;
                    result = Err(GatewayError::StreamingError { message });
                }
            }
        }
        if let Some(task) = self.stderr.take() {
            task.abort();
        }
        if let Some(temp) = self.temp.take() {
            let _ = temp.close();
        }
        result
    }
}
