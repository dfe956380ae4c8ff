// Fetch interactor - Concurrent fetch, probe and replay of source streams

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::domain::model::{MediaInfo, StreamRole};
use crate::error::{GatewayError, GatewayResult};
use crate::ports::*;
use crate::probe::{ProbedInfo, DEFAULT_PROBE_BYTES};
use crate::streams::{ByteSource, ReplayReader, SourceHandle};

/// Live, probed source for one role
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub format_id: String,
    /// Replays the probed prefix first. Roles fetched from the same format
    /// share one handle.
    pub handle: SourceHandle,
    pub probed: ProbedInfo,
}

/// Fetch processes and temp state of one request
#[derive(Default)]
pub struct FetchHandles {
    handles: Vec<(String, Box<dyn FetchHandle>)>,
}

impl FetchHandles {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every fetch, returning the first failure. Later calls do nothing.
    pub async fn close(&mut self) -> GatewayResult<()> {
        let mut first_error = None;
        for (_, mut handle) in self.handles.drain(..) {
            if let Err(e) = handle.close().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Result of a successful fetch
pub struct FetchOutcome {
    pub roles: BTreeMap<StreamRole, FetchedSource>,
    pub handles: FetchHandles,
}

/// What one format fetch leaves in the results table
struct FetchSlot {
    handle: Option<Box<dyn FetchHandle>>,
    outcome: GatewayResult<(ReplayReader<ByteSource>, ProbedInfo)>,
}

/// Interactor for the fetch/probe use case
pub struct FetchInteractor {
    extractor_port: Arc<dyn ExtractorPort>,
    probe_port: Arc<dyn ProbePort>,
    log_port: Arc<dyn LogPort>,
    probe_bytes: u64,
}

impl FetchInteractor {
    /// Create new fetch interactor with injected ports
    pub fn new(
        extractor_port: Arc<dyn ExtractorPort>,
        probe_port: Arc<dyn ProbePort>,
        log_port: Arc<dyn LogPort>,
    ) -> Self {
        Self {
            extractor_port,
            probe_port,
            log_port,
            probe_bytes: DEFAULT_PROBE_BYTES,
        }
    }

    /// Bytes sampled from each source before probing
    pub fn with_probe_bytes(mut self, probe_bytes: u64) -> Self {
        self.probe_bytes = probe_bytes;
        self
    }

    /// Fetch the source of every role, each distinct format once and all of
    /// them concurrently. The first failure cancels the remaining fetches;
    /// every started fetch is closed before the first error (in format id
    /// order, cancellations last) is returned.
    pub async fn fetch(
        &self,
        info: &MediaInfo,
        roles: &BTreeMap<StreamRole, String>,
        cancel: &CancellationToken,
    ) -> GatewayResult<FetchOutcome> {
        let ids: BTreeSet<&str> = roles.values().map(String::as_str).collect();
        self.log_port
            .info(&format!(
                "fetching {} source stream(s) of {}: {}",
                ids.len(),
                info.id,
                ids.iter().copied().collect::<Vec<_>>().join(", ")
            ))
            .await;

        // Cancelled on the first failure so stalled siblings give up
        let siblings = cancel.child_token();
        let table: Mutex<BTreeMap<String, FetchSlot>> = Mutex::new(BTreeMap::new());
        join_all(ids.iter().map(|id| self.fetch_one(info, id, &siblings, &table))).await;
        let table = table.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut handles = FetchHandles::default();
        let mut first_error = None;
        let mut ready = BTreeMap::new();
        for (id, slot) in table {
            if let Some(handle) = slot.handle {
                handles.handles.push((id.clone(), handle));
            }
            match slot.outcome {
                Ok(fetched) => {
                    ready.insert(id, fetched);
                }
                Err(e) => {
                    // The failure that stopped the others beats their cancellation
                    let replaces = match &first_error {
                        None => true,
                        Some(GatewayError::Cancelled) => !matches!(e, GatewayError::Cancelled),
                        Some(_) => false,
                    };
                    if replaces {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            drop(ready);
            if let Err(close_error) = handles.close().await {
                self.log_port
                    .warn(&format!("closing fetches after failure: {}", close_error))
                    .await;
            }
            return Err(e);
        }

        let shared: BTreeMap<String, (SourceHandle, ProbedInfo)> = ready
            .into_iter()
            .map(|(id, (reader, probed))| {
                let handle = SourceHandle::new(id.clone(), reader);
                (id, (handle, probed))
            })
            .collect();

        let mut by_role = BTreeMap::new();
        for (role, id) in roles {
            if let Some((handle, probed)) = shared.get(id) {
                by_role.insert(
                    *role,
                    FetchedSource {
                        format_id: id.clone(),
                        handle: handle.clone(),
                        probed: probed.clone(),
                    },
                );
            }
        }

        Ok(FetchOutcome {
            roles: by_role,
            handles,
        })
    }

    async fn fetch_one(
        &self,
        info: &MediaInfo,
        id: &str,
        cancel: &CancellationToken,
        table: &Mutex<BTreeMap<String, FetchSlot>>,
    ) {
        let slot = match self.extractor_port.download(info, id, cancel).await {
            Ok(fetched) => {
                let mut reader = ReplayReader::new(fetched.reader);
                let probed = self
                    .probe_port
                    .probe_reader(&mut reader, self.probe_bytes, cancel)
                    .await;
                let outcome = probed.map(|probed| {
                    reader.arm();
                    (reader, probed)
                });
                FetchSlot {
                    handle: Some(fetched.handle),
                    outcome,
                }
            }
            Err(e) => FetchSlot {
                handle: None,
                outcome: Err(e),
            },
        };

        match &slot.outcome {
            Ok((reader, probed)) => {
                self.log_port
                    .debug(&format!(
                        "format {} probed as {} after {} bytes",
                        id,
                        probed.format_name,
                        reader.buffered()
                    ))
                    .await
            }
            Err(e) => {
                cancel.cancel();
                self.log_port.warn(&format!("format {} failed: {}", id, e)).await
            }
        }

        table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.to_string(), slot);
    }
}
