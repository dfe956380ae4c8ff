//! Encoder process lifecycle: start, forward, wait

use std::collections::VecDeque;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::tracing_log::NopLogAdapter;
use crate::engine::args::{build_args, Layout};
use crate::engine::fds::{self, DescriptorAllocator, FIRST_EXTRA_DESCRIPTOR};
use crate::engine::{Input, Output, StreamSession};
use crate::error::{GatewayError, GatewayResult};
use crate::ports::LogPort;
use crate::streams::{ByteSink, ByteSource};

/// Stderr lines kept for the failure message
const STDERR_TAIL_LINES: usize = 8;

/// Default flags placed before everything else
pub fn default_global_flags() -> Vec<String> {
    ["-hide_banner", "-nostdin", "-loglevel", "error"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One encoder invocation, described but not started
pub struct Pipeline {
    program: String,
    leading_args: Vec<String>,
    global_flags: Vec<String>,
    sessions: Vec<StreamSession>,
    log: Arc<dyn LogPort>,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: vec![],
            global_flags: default_global_flags(),
            sessions: vec![],
            log: Arc::new(NopLogAdapter),
            cancel: CancellationToken::new(),
        }
    }

    /// Arguments placed before the generated ones, for wrapper programs
    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_global_flags(mut self, flags: Vec<String>) -> Self {
        self.global_flags = flags;
        self
    }

    pub fn with_session(mut self, session: StreamSession) -> Self {
        self.sessions.push(session);
        self
    }

    pub fn with_log(mut self, log: Arc<dyn LogPort>) -> Self {
        self.log = log;
        self
    }

    /// Killing the encoder when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Full argument list after the leading args, with descriptor numbers
    /// assigned the way `start` assigns them
    pub fn arguments(&self) -> Vec<String> {
        let layout = Layout::new(&self.sessions);
        let mut allocator = DescriptorAllocator::new();
        let inputs: Vec<String> = layout
            .inputs
            .iter()
            .map(|d| match &d.input {
                Input::Stream(_) => format!("pipe:{}", allocator.allocate()),
                Input::Location(url) => url.clone(),
            })
            .collect();
        let outputs: Vec<String> = layout
            .outputs
            .iter()
            .map(|o| match o {
                Output::Stream(_) => format!("pipe:{}", allocator.allocate()),
                Output::Location(url) => url.clone(),
            })
            .collect();
        build_args(&self.global_flags, &self.sessions, &layout, &inputs, &outputs)
    }

    /// Allocate pipes, spawn the encoder and start forwarding. Nothing is
    /// left running when this fails.
    pub async fn start(self) -> GatewayResult<ProcessSession> {
        if self.sessions.is_empty() {
            return Err(GatewayError::PipelineError {
                message: "pipeline has no output sessions".to_string(),
            });
        }

        let layout = Layout::new(&self.sessions);
        let stream_count = layout
            .inputs
            .iter()
            .filter(|d| matches!(d.input, Input::Stream(_)))
            .count()
            + layout
                .outputs
                .iter()
                .filter(|o| matches!(o, Output::Stream(_)))
                .count();
        let reserved = FIRST_EXTRA_DESCRIPTOR + stream_count as i32;

        let mut allocator = DescriptorAllocator::new();
        let mut endpoints = Vec::with_capacity(stream_count);
        let mut pending_inputs: Vec<(String, ByteSource, pipe::Sender)> = vec![];
        let mut pending_outputs: Vec<(String, pipe::Receiver, ByteSink)> = vec![];

        let mut input_urls = Vec::with_capacity(layout.inputs.len());
        for (index, distinct) in layout.inputs.iter().enumerate() {
            match &distinct.input {
                Input::Stream(handle) => {
                    let source = handle.take().ok_or_else(|| GatewayError::PipelineError {
                        message: format!("input stream {} is already consumed", handle.label()),
                    })?;
                    let (endpoint, sender) = fds::input_pipe(allocator.allocate(), index, reserved)
                        .map_err(|e| pipe_error("input", e))?;
                    input_urls.push(endpoint.url());
                    endpoints.push(endpoint);
                    pending_inputs.push((handle.label().to_string(), source, sender));
                }
                Input::Location(url) => input_urls.push(url.clone()),
            }
        }

        let mut output_urls = Vec::with_capacity(layout.outputs.len());
        for output in &layout.outputs {
            match output {
                Output::Stream(handle) => {
                    let sink = handle.take().ok_or_else(|| GatewayError::PipelineError {
                        message: format!("output stream {} is already consumed", handle.label()),
                    })?;
                    let (endpoint, receiver) = fds::output_pipe(allocator.allocate(), reserved)
                        .map_err(|e| pipe_error("output", e))?;
                    output_urls.push(endpoint.url());
                    endpoints.push(endpoint);
                    pending_outputs.push((handle.label().to_string(), receiver, sink));
                }
                Output::Location(url) => output_urls.push(url.clone()),
            }
        }

        let args = build_args(&self.global_flags, &self.sessions, &layout, &input_urls, &output_urls);
        self.log
            .debug(&format!(
                "starting {} {} {}",
                self.program,
                self.leading_args.join(" "),
                args.join(" ")
            ))
            .await;

        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        fds::install(&mut command, &endpoints);

        let mut child = command.spawn().map_err(|e| GatewayError::PipelineError {
            message: format!("failed to start {}: {}", self.program, e),
        })?;
        // The child holds its own copies now
        drop(endpoints);

        let stderr = spawn_stderr_logger(&mut child, &self.program, self.log.clone());
        let exited = CancellationToken::new();

        let mut forwarders = Vec::with_capacity(pending_inputs.len() + pending_outputs.len());
        for (label, source, sender) in pending_inputs {
            forwarders.push(tokio::spawn(forward_input(label, source, sender, exited.clone())));
        }
        for (label, receiver, sink) in pending_outputs {
            forwarders.push(tokio::spawn(forward_output(
                label,
                receiver,
                sink,
                self.cancel.clone(),
            )));
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(wait_for_exit(child, self.cancel.clone(), exited, exit_tx));

        Ok(ProcessSession {
            program: self.program,
            forwarders,
            exit: exit_rx,
            stderr,
        })
    }
}

/// A running encoder. Consumed by [`ProcessSession::wait`].
#[derive(Debug)]
pub struct ProcessSession {
    program: String,
    forwarders: Vec<JoinHandle<GatewayResult<()>>>,
    exit: oneshot::Receiver<GatewayResult<ExitStatus>>,
    stderr: JoinHandle<Vec<String>>,
}

impl ProcessSession {
    /// Wait for every forwarder and the process. A forwarding error takes
    /// precedence over the process result.
    pub async fn wait(self) -> GatewayResult<()> {
        let mut first_error = None;

        for forwarder in self.forwarders {
            let result = forwarder.await.unwrap_or_else(|e| {
                Err(GatewayError::StreamingError {
                    message: format!("forwarding task failed: {}", e),
                })
            });
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        let exit = self.exit.await.unwrap_or_else(|_| {
            Err(GatewayError::PipelineError {
                message: format!("lost exit status of {}", self.program),
            })
        });
        let tail = self.stderr.await.unwrap_or_default();

        let process_result = match exit {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => {
                let mut message = format!("{} exited with {}", self.program, status);
                if !tail.is_empty() {
                    message.push_str(": ");
                    message.push_str(&tail.join("; "));
                }
                Err(GatewayError::StreamingError { message })
            }
            Err(e) => Err(e),
        };

        match first_error {
            Some(e) => Err(e),
            None => process_result,
        }
    }
}

fn pipe_error(direction: &str, e: io::Error) -> GatewayError {
    GatewayError::PipelineError {
        message: format!("failed to allocate {} pipe: {}", direction, e),
    }
}

/// Source into the encoder. Stops quietly once the encoder has exited or
/// closed its end.
async fn forward_input(
    label: String,
    mut source: ByteSource,
    mut sender: pipe::Sender,
    exited: CancellationToken,
) -> GatewayResult<()> {
    let result = tokio::select! {
        result = tokio::io::copy(&mut source, &mut sender) => result,
        _ = exited.cancelled() => return Ok(()),
    };
    match result {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(GatewayError::StreamingError {
            message: format!("forwarding input {} failed: {}", label, e),
        }),
    }
    // sender drops here and the encoder sees EOF
}

/// Encoder output into the sink, shut down at EOF
async fn forward_output(
    label: String,
    mut receiver: pipe::Receiver,
    mut sink: ByteSink,
    cancel: CancellationToken,
) -> GatewayResult<()> {
    let result = tokio::select! {
        result = tokio::io::copy(&mut receiver, &mut sink) => result,
        _ = cancel.cancelled() => return Ok(()),
    };
    match result {
        Ok(_) => {
            let _ = sink.shutdown().await;
            Ok(())
        }
        Err(e) => Err(GatewayError::StreamingError {
            message: format!("forwarding output {} failed: {}", label, e),
        }),
    }
}

fn spawn_stderr_logger(
    child: &mut Child,
    program: &str,
    log: Arc<dyn LogPort>,
) -> JoinHandle<Vec<String>> {
    let stderr = child.stderr.take();
    let program = program.to_string();
    tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                log.debug(&format!("{}: {}", program, line)).await;
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        tail.into_iter().collect()
    })
}

async fn wait_for_exit(
    mut child: Child,
    cancel: CancellationToken,
    exited: CancellationToken,
    exit_tx: oneshot::Sender<GatewayResult<ExitStatus>>,
) {
    let status = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let outcome = match status {
        Some(Ok(status)) => Ok(status),
        Some(Err(e)) => Err(GatewayError::PipelineError {
            message: format!("failed to wait for encoder: {}", e),
        }),
        None => {
            // Already exited is fine
            let _ = child.kill().await;
            Err(GatewayError::Cancelled)
        }
    };
    exited.cancel();
    let _ = exit_tx.send(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Codec, ContainerFormat, Map};
    use crate::streams::{SinkHandle, SourceHandle};

    #[test]
    fn test_arguments_number_pipes_inputs_first() {
        let audio = Input::Stream(SourceHandle::new("251", &b""[..]));
        let video = Input::Stream(SourceHandle::new("137", &b""[..]));
        let session = StreamSession::new(
            ContainerFormat::new("mp4"),
            Output::Stream(SinkHandle::new("out", tokio::io::sink())),
        )
        .with_map(Map {
            input: audio.clone(),
            specifier: "a:0".to_string(),
            codec: Codec::Audio("copy".to_string()),
            codec_flags: vec![],
        })
        .with_map(Map {
            input: video,
            specifier: "v:0".to_string(),
            codec: Codec::Video("copy".to_string()),
            codec_flags: vec![],
        });

        let args = Pipeline::new("ffmpeg")
            .with_global_flags(vec![])
            .with_session(session)
            .arguments();

        assert_eq!(
            args,
            vec![
                "-i", "pipe:3", "-i", "pipe:4", "-map", "0:a:0", "-codec:a", "copy", "-map",
                "1:v:0", "-codec:v", "copy", "-f", "mp4", "pipe:5"
            ]
        );
    }

    #[tokio::test]
    async fn test_start_without_sessions_fails() {
        let result = Pipeline::new("ffmpeg").start().await;
        assert!(matches!(result, Err(GatewayError::PipelineError { .. })));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_pipeline_error() {
        let input = Input::Stream(SourceHandle::new("251", &b"abc"[..]));
        let session = StreamSession::new(
            ContainerFormat::new("mp3"),
            Output::Location("/dev/null".to_string()),
        )
        .with_map(Map {
            input,
            specifier: "a:0".to_string(),
            codec: Codec::Audio("copy".to_string()),
            codec_flags: vec![],
        });

        let result = Pipeline::new("/nonexistent/mediagate-encoder")
            .with_session(session)
            .start()
            .await;
        assert!(matches!(result, Err(GatewayError::PipelineError { .. })));
    }
}
