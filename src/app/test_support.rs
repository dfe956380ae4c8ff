//! Port fakes shared by the interactor tests

use std::collections::BTreeMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::domain::model::MediaInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::ports::*;
use crate::probe::{ProbeStream, ProbedInfo};

/// What every fake download streams
#[derive(Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Endless,
    /// Never produces a byte nor EOF
    Stalled,
}

struct StalledReader;

impl AsyncRead for StalledReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Poll::Pending
    }
}

/// Extractor serving one document, counting calls and closes
pub struct FakeExtractor {
    pub info: MediaInfo,
    pub payload: Payload,
    pub fail_id: Option<&'static str>,
    pub info_calls: AtomicUsize,
    pub downloads: Mutex<Vec<String>>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeExtractor {
    pub fn new(info: MediaInfo, payload: Payload) -> Self {
        Self {
            info,
            payload,
            fail_id: None,
            info_calls: AtomicUsize::new(0),
            downloads: Mutex::new(vec![]),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Downloaded format ids, sorted
    pub fn downloads(&self) -> Vec<String> {
        let mut downloads = self.downloads.lock().unwrap().clone();
        downloads.sort();
        downloads
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }
}

struct FakeHandle {
    closed: Arc<AtomicUsize>,
    done: bool,
}

#[async_trait]
impl FetchHandle for FakeHandle {
    async fn close(&mut self) -> GatewayResult<()> {
        if !self.done {
            self.done = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl ExtractorPort for FakeExtractor {
    async fn info(&self, _url: &str, _cancel: &CancellationToken) -> GatewayResult<MediaInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.info.clone())
    }

    async fn download(
        &self,
        _info: &MediaInfo,
        format_id: &str,
        _cancel: &CancellationToken,
    ) -> GatewayResult<FetchedStream> {
        self.downloads.lock().unwrap().push(format_id.to_string());
        if self.fail_id == Some(format_id) {
            return Err(GatewayError::FetchError {
                message: format!("format {} unavailable", format_id),
            });
        }
        let reader: crate::streams::ByteSource = match &self.payload {
            Payload::Bytes(bytes) => Box::new(Cursor::new(bytes.clone())),
            Payload::Endless => Box::new(tokio::io::repeat(0x55)),
            Payload::Stalled => Box::new(StalledReader),
        };
        Ok(FetchedStream {
            reader,
            handle: Box::new(FakeHandle {
                closed: self.closed.clone(),
                done: false,
            }),
        })
    }
}

/// Probe consuming its budget and reporting fixed streams, or failing
pub struct FakeProbe {
    pub fail: bool,
    pub format_name: &'static str,
    /// (codec_type, codec_name)
    pub streams: Vec<(&'static str, &'static str)>,
}

impl FakeProbe {
    pub fn reporting(format_name: &'static str, streams: &[(&'static str, &'static str)]) -> Self {
        Self {
            fail: false,
            format_name,
            streams: streams.to_vec(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            format_name: "",
            streams: vec![],
        }
    }
}

#[async_trait]
impl ProbePort for FakeProbe {
    async fn probe_reader(
        &self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
        max_bytes: u64,
        cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo> {
        let mut sample = Vec::new();
        let mut limited = reader.take(max_bytes);
        tokio::select! {
            read = limited.read_to_end(&mut sample) => read?,
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
        };
        self.report()
    }

    async fn probe_location(
        &self,
        _location: &str,
        _cancel: &CancellationToken,
    ) -> GatewayResult<ProbedInfo> {
        self.report()
    }
}

impl FakeProbe {
    fn report(&self) -> GatewayResult<ProbedInfo> {
        if self.fail {
            return Err(GatewayError::ProbeError {
                message: "unrecognized data".to_string(),
            });
        }
        Ok(ProbedInfo {
            format_name: self.format_name.to_string(),
            streams: self
                .streams
                .iter()
                .map(|(codec_type, codec_name)| ProbeStream {
                    codec_type: codec_type.to_string(),
                    codec_name: codec_name.to_string(),
                    bit_rate: None,
                    tags: BTreeMap::new(),
                })
                .collect(),
            duration: None,
        })
    }
}
