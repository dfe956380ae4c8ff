// Download interactor - Fetch, negotiate, encode and deliver one media item

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWriteExt, DuplexStream};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::app::fetch_interactor::{FetchHandles, FetchInteractor, FetchOutcome, FetchedSource};
use crate::domain::model::*;
use crate::domain::rules::{choose_best_source, choose_codec, plan_streams, CodecOverrides, StreamPlan};
use crate::engine::{Codec, ContainerFormat, Input, Map, Output, Pipeline, StreamSession};
use crate::error::{GatewayError, GatewayResult};
use crate::output::{id3v2, media_filename, mime_type_for_extension};
use crate::ports::*;
use crate::streams::{ByteSource, SinkHandle};

/// In-memory pipe capacity between the encoder and the consumer
const DELIVERY_BUFFER: usize = 64 * 1024;

/// One download request
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub url: String,
    /// Target format name, `None` for the best source as is
    pub format: Option<String>,
    /// Codecs to force, applied to every role that supports them
    pub codecs: Vec<String>,
    /// Encode even when the source codec already matches
    pub retranscode: bool,
    pub cancel: CancellationToken,
}

impl DownloadOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: None,
            codecs: vec![],
            retranscode: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_codecs(mut self, codecs: Vec<String>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_retranscode(mut self, retranscode: bool) -> Self {
        self.retranscode = retranscode;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Delivered media stream
pub struct Media {
    pub filename: String,
    pub mime_type: String,
    pub reader: ByteSource,
}

/// Final result of a download, available once every background task is done
pub struct CompletionGate {
    rx: oneshot::Receiver<GatewayResult<()>>,
}

impl CompletionGate {
    /// Wait for the encoder and every fetch to finish and be cleaned up.
    /// Await this after dropping (or fully reading) the media reader.
    pub async fn wait(self) -> GatewayResult<()> {
        self.rx.await.unwrap_or_else(|_| {
            Err(GatewayError::StreamingError {
                message: "delivery task ended without a result".to_string(),
            })
        })
    }
}

pub struct DownloadResult {
    pub media: Media,
    pub gate: CompletionGate,
}

/// Interactor for the download use case
pub struct DownloadInteractor {
    extractor_port: Arc<dyn ExtractorPort>,
    fetch_interactor: Arc<FetchInteractor>,
    log_port: Arc<dyn LogPort>,
    catalog: Arc<FormatCatalog>,
    encoder: String,
    encoder_args: Vec<String>,
}

impl DownloadInteractor {
    /// Create new download interactor with injected ports
    pub fn new(
        extractor_port: Arc<dyn ExtractorPort>,
        fetch_interactor: Arc<FetchInteractor>,
        log_port: Arc<dyn LogPort>,
        catalog: Arc<FormatCatalog>,
    ) -> Self {
        Self {
            extractor_port,
            fetch_interactor,
            log_port,
            catalog,
            encoder: "ffmpeg".to_string(),
            encoder_args: vec![],
        }
    }

    /// Encoder program and arguments placed before the generated ones
    pub fn with_encoder(mut self, program: impl Into<String>, leading_args: Vec<String>) -> Self {
        self.encoder = program.into();
        self.encoder_args = leading_args;
        self
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    /// Start a download. Everything that can fail before media bytes flow
    /// fails here; later failures arrive through the completion gate.
    pub async fn download(&self, options: DownloadOptions) -> GatewayResult<DownloadResult> {
        let format = match options.format.as_deref() {
            Some(name) => Some(
                self.catalog
                    .find(name)
                    .cloned()
                    .ok_or_else(|| GatewayError::NoSuchFormat {
                        name: name.to_string(),
                    })?,
            ),
            None => None,
        };

        let request = options.cancel.child_token();
        let info = self.extractor_port.info(&options.url, &request).await?;

        match format {
            Some(format) => self.transcode(info, format, &options, request).await,
            None => self.passthrough(info, request).await,
        }
    }

    async fn passthrough(
        &self,
        info: MediaInfo,
        request: CancellationToken,
    ) -> GatewayResult<DownloadResult> {
        let source = choose_best_source(&info.formats)
            .cloned()
            .ok_or_else(|| GatewayError::NegotiationError {
                message: format!("{} has no source streams", info.id),
            })?;
        self.log_port
            .info(&format!("delivering format {} of {} as is", source.format_id, info.id))
            .await;

        let FetchedStream { reader, mut handle } = self
            .extractor_port
            .download(&info, &source.format_id, &request)
            .await?;

        let ext = source
            .ext
            .clone()
            .or_else(|| info.ext.clone())
            .unwrap_or_else(|| "bin".to_string());
        let filename = media_filename(&info.title, &ext);
        let mime_type = mime_type_for_extension(&ext).to_string();

        let (consumer_writer, consumer_reader) = tokio::io::duplex(DELIVERY_BUFFER);
        let (gate_tx, gate_rx) = oneshot::channel();
        let log = self.log_port.clone();
        let label = filename.clone();

        tokio::spawn(async move {
            let delivered = deliver(None, reader, consumer_writer, &request).await;
            if delivered.is_err() {
                request.cancel();
            }
            let closed = handle.close().await;
            let result = finish(&label, delivered, Ok(()), closed, log.as_ref()).await;
            let _ = gate_tx.send(result);
        });

        Ok(DownloadResult {
            media: Media {
                filename,
                mime_type,
                reader: Box::new(consumer_reader),
            },
            gate: CompletionGate { rx: gate_rx },
        })
    }

    async fn transcode(
        &self,
        info: MediaInfo,
        format: TargetFormat,
        options: &DownloadOptions,
        request: CancellationToken,
    ) -> GatewayResult<DownloadResult> {
        let overrides = CodecOverrides::for_all_roles(options.codecs.iter().cloned());
        let plans = plan_streams(&format, &info.formats, &overrides)?;
        for plan in &plans {
            self.log_port
                .debug(&format!("{} stream from format {}", plan.spec.media, plan.source_id))
                .await;
        }

        let roles: BTreeMap<StreamRole, String> = plans
            .iter()
            .map(|p| (p.spec.media, p.source_id.clone()))
            .collect();
        let FetchOutcome {
            roles: fetched,
            mut handles,
        } = self.fetch_interactor.fetch(&info, &roles, &request).await?;

        let metadata = Metadata::from_media_info(&info);
        let (engine_writer, engine_reader) = tokio::io::duplex(DELIVERY_BUFFER);
        let output = Output::Stream(SinkHandle::new("output", engine_writer));

        let session = match self
            .build_session(&format, &plans, &fetched, &metadata, options.retranscode, output)
            .await
        {
            Ok(session) => session,
            Err(e) => return Err(abandon(handles, e).await),
        };

        let pipeline = Pipeline::new(self.encoder.clone())
            .with_leading_args(self.encoder_args.clone())
            .with_session(session)
            .with_log(self.log_port.clone())
            .with_cancel(request.clone());
        let process = match pipeline.start().await {
            Ok(process) => process,
            Err(e) => return Err(abandon(handles, e).await),
        };

        let header = match format.prepend {
            Some(Prepend::Id3v2) => Some(id3v2::header(&metadata)),
            None => None,
        };
        let filename = media_filename(&info.title, &format.ext);
        let (consumer_writer, consumer_reader) = tokio::io::duplex(DELIVERY_BUFFER);
        let (gate_tx, gate_rx) = oneshot::channel();
        let log = self.log_port.clone();
        let label = filename.clone();

        tokio::spawn(async move {
            let delivered = deliver(header, engine_reader, consumer_writer, &request).await;
            if delivered.is_err() {
                request.cancel();
            }
            let waited = process.wait().await;
            let closed = handles.close().await;
            let result = finish(&label, delivered, waited, closed, log.as_ref()).await;
            let _ = gate_tx.send(result);
        });

        Ok(DownloadResult {
            media: Media {
                filename,
                mime_type: format.mime_type.clone(),
                reader: Box::new(consumer_reader),
            },
            gate: CompletionGate { rx: gate_rx },
        })
    }

    async fn build_session(
        &self,
        format: &TargetFormat,
        plans: &[StreamPlan],
        fetched: &BTreeMap<StreamRole, FetchedSource>,
        metadata: &Metadata,
        retranscode: bool,
        output: Output,
    ) -> GatewayResult<StreamSession> {
        let mut container = ContainerFormat {
            name: format.container().to_string(),
            flags: format.format_flags.clone(),
        };
        let mut maps = Vec::with_capacity(plans.len());

        for plan in plans {
            let role = plan.spec.media;
            let source = fetched
                .get(&role)
                .ok_or(GatewayError::NoSuchStream { role })?;

            // The probe is authoritative over what the extractor declared
            let Some(probed) = source.probed.codec(role) else {
                if plan.spec.optional {
                    continue;
                }
                return Err(GatewayError::NoSuchStream { role });
            };

            let decision = choose_codec(
                &plan.spec,
                plan.forced.as_ref(),
                Some(probed),
                retranscode,
                &self.catalog,
            )?;
            self.log_port
                .info(&format!(
                    "{} stream: format {} ({}) -> {}",
                    role, source.format_id, probed, decision.codec
                ))
                .await;

            container.flags.extend(decision.format_flags.iter().cloned());
            maps.push(Map {
                input: Input::Stream(source.handle.clone()),
                specifier: plan.spec.specifier.clone(),
                codec: Codec::for_role(role, decision.codec),
                codec_flags: decision.flags,
            });
        }

        if maps.is_empty() {
            return Err(GatewayError::NegotiationError {
                message: format!("no probed stream matches format {}", format.name),
            });
        }

        let mut session = StreamSession::new(container, output);
        session.maps = maps;
        session.metadata = metadata.tags();
        if format.prepend == Some(Prepend::Id3v2) {
            // The header is written in front of the output instead
            session
                .output_flags
                .extend(["-id3v2_version".to_string(), "0".to_string()]);
        }
        Ok(session)
    }
}

/// Close every fetch after a setup failure and hand back the failure
async fn abandon(mut handles: FetchHandles, error: GatewayError) -> GatewayError {
    let _ = handles.close().await;
    error
}

/// Copy `source` to the consumer, after `header` if any. A vanished consumer
/// counts as cancellation.
async fn deliver(
    header: Option<Vec<u8>>,
    mut source: impl AsyncRead + Unpin,
    mut consumer: DuplexStream,
    cancel: &CancellationToken,
) -> GatewayResult<u64> {
    let copy = async {
        if let Some(header) = &header {
            consumer.write_all(header).await?;
        }
        let copied = tokio::io::copy(&mut source, &mut consumer).await?;
        consumer.shutdown().await?;
        Ok::<_, io::Error>(copied)
    };

    let result = tokio::select! {
        result = copy => result,
        _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
    };
    result.map_err(|e| match e.kind() {
        io::ErrorKind::BrokenPipe => GatewayError::Cancelled,
        _ => GatewayError::StreamingError {
            message: format!("delivery failed: {}", e),
        },
    })
}

/// First failure among delivery, encoder and cleanup
async fn finish(
    label: &str,
    delivered: GatewayResult<u64>,
    waited: GatewayResult<()>,
    closed: GatewayResult<()>,
    log: &dyn LogPort,
) -> GatewayResult<()> {
    let bytes = delivered.as_ref().ok().copied();
    let result = delivered.and(waited).and(closed);
    match (&result, bytes) {
        (Ok(()), Some(bytes)) => log.info(&format!("delivered {} ({} bytes)", label, bytes)).await,
        (Err(e), _) => log.warn(&format!("delivery of {} failed: {}", label, e)).await,
        _ => {}
    }
    result
}
