//! Integration tests for the process pipeline engine
//!
//! `sh` stands in for the encoder: the generated encoder arguments land in
//! `$1...` and are ignored, the script works on the inherited descriptors.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use mediagate::engine::{Codec, ContainerFormat, Input, Map, Output, Pipeline, StreamSession};
use mediagate::error::GatewayError;
use mediagate::streams::{SinkHandle, SourceHandle};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

// Test utilities

fn shell_encoder(script: &str) -> Pipeline {
    Pipeline::new("sh").with_leading_args(["-c", script, "ffmpeg"])
}

fn copy_map(input: &Input, specifier: &str) -> Map {
    Map {
        input: input.clone(),
        specifier: specifier.to_string(),
        codec: Codec::Audio("copy".to_string()),
        codec_flags: vec![],
    }
}

/// Reader yielding `data`, then failing
struct FailingReader {
    data: Vec<u8>,
}

impl FailingReader {
    fn after(data: &[u8]) -> Self {
        Self { data: data.to_vec() }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.data.is_empty() {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "gone")));
        }
        let n = self.data.len().min(buf.remaining());
        buf.put_slice(&self.data[..n]);
        self.data.drain(..n);
        Poll::Ready(Ok(()))
    }
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

// Forwarding tests

#[tokio::test]
async fn test_pipeline_round_trip() {
    let data = payload(300_000);
    let input = Input::Stream(SourceHandle::new("source", std::io::Cursor::new(data.clone())));
    let (sink, mut consumer) = tokio::io::duplex(16 * 1024);
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Stream(SinkHandle::new("output", sink)),
    )
    .with_map(copy_map(&input, "a:0"));

    let process = shell_encoder("exec cat <&3 >&4")
        .with_session(session)
        .start()
        .await
        .unwrap();

    let mut received = Vec::new();
    let (read, waited) = tokio::join!(consumer.read_to_end(&mut received), process.wait());

    read.unwrap();
    waited.unwrap();
    assert_eq!(received, data);
}

#[tokio::test]
async fn test_pipeline_two_inputs_in_descriptor_order() {
    let audio = Input::Stream(SourceHandle::new("251", &b"audio-bytes;"[..]));
    let video = Input::Stream(SourceHandle::new("137", &b"video-bytes"[..]));
    let (sink, mut consumer) = tokio::io::duplex(1024);
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Stream(SinkHandle::new("output", sink)),
    )
    .with_map(copy_map(&audio, "a:0"))
    .with_map(copy_map(&video, "v:0"));

    let process = shell_encoder("cat <&3 >&5 && cat <&4 >&5")
        .with_session(session)
        .start()
        .await
        .unwrap();

    let mut received = Vec::new();
    let (read, waited) = tokio::join!(consumer.read_to_end(&mut received), process.wait());

    read.unwrap();
    waited.unwrap();
    assert_eq!(received, b"audio-bytes;video-bytes");
}

#[tokio::test]
async fn test_shared_input_gets_one_descriptor() {
    let source = Input::Stream(SourceHandle::new("22", &b"muxed"[..]));
    let session = StreamSession::new(
        ContainerFormat::new("mp4"),
        Output::Location("out.mp4".to_string()),
    )
    .with_map(copy_map(&source, "a:0"))
    .with_map(copy_map(&source, "v:0"));

    let args = Pipeline::new("ffmpeg")
        .with_global_flags(vec![])
        .with_session(session)
        .arguments();

    assert_eq!(args.iter().filter(|a| a.as_str() == "-i").count(), 1);
    assert!(args.contains(&"pipe:3".to_string()));
    assert!(args.contains(&"0:v:0".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
}

// Failure tests

#[tokio::test]
async fn test_encoder_failure_with_endless_sources() {
    let audio = Input::Stream(SourceHandle::new("251", tokio::io::repeat(0x2a)));
    let video = Input::Stream(SourceHandle::new("137", tokio::io::repeat(0x2b)));
    let (sink, _consumer) = tokio::io::duplex(1024);
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Stream(SinkHandle::new("output", sink)),
    )
    .with_map(copy_map(&audio, "a:0"))
    .with_map(copy_map(&video, "v:0"));

    let process = shell_encoder("echo 'bad input' >&2; exit 3")
        .with_session(session)
        .start()
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), process.wait())
        .await
        .expect("wait must not hang");

    match result {
        Err(GatewayError::StreamingError { message }) => {
            assert!(message.contains("bad input"), "{}", message);
        }
        other => panic!("expected a streaming error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_source_read_error_beats_clean_exit() {
    let input = Input::Stream(SourceHandle::new("251", FailingReader::after(b"abc")));
    let (sink, mut consumer) = tokio::io::duplex(1024);
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Stream(SinkHandle::new("output", sink)),
    )
    .with_map(copy_map(&input, "a:0"));

    let process = shell_encoder("exec cat <&3 >&4")
        .with_session(session)
        .start()
        .await
        .unwrap();

    let mut received = Vec::new();
    let (read, waited) = tokio::time::timeout(
        Duration::from_secs(10),
        async { tokio::join!(consumer.read_to_end(&mut received), process.wait()) },
    )
    .await
    .expect("wait must not hang");

    read.unwrap();
    match waited {
        Err(GatewayError::StreamingError { message }) => {
            assert!(message.contains("251"), "{}", message);
        }
        other => panic!("expected a streaming error, got {:?}", other),
    }
    assert_eq!(received, b"abc");
}

#[tokio::test]
async fn test_cancel_stops_stalled_pipeline() {
    // Writer stays open and never writes
    let (_writer, stalled) = tokio::io::duplex(64);
    let input = Input::Stream(SourceHandle::new("stalled", stalled));
    let (sink, _consumer) = tokio::io::duplex(1024);
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Stream(SinkHandle::new("output", sink)),
    )
    .with_map(copy_map(&input, "a:0"));

    let cancel = CancellationToken::new();
    let process = shell_encoder("exec cat <&3 >&4")
        .with_cancel(cancel.clone())
        .with_session(session)
        .start()
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(10), process.wait())
        .await
        .expect("cancel must stop the pipeline");
    assert!(matches!(result, Err(GatewayError::Cancelled)));
}

#[tokio::test]
async fn test_consumed_source_is_rejected() {
    let handle = SourceHandle::new("once", &b"x"[..]);
    let _ = handle.take();
    let session = StreamSession::new(
        ContainerFormat::new("matroska"),
        Output::Location("/dev/null".to_string()),
    )
    .with_map(copy_map(&Input::Stream(handle), "a:0"));

    let result = shell_encoder("exit 0").with_session(session).start().await;
    assert!(matches!(result, Err(GatewayError::PipelineError { .. })));
}
