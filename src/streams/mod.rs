//! Byte stream handles shared between pipeline stages

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncWrite};

pub mod replay;

pub use replay::ReplayReader;

/// Readable byte stream
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;
/// Writable byte stream
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

struct Slot<T> {
    label: String,
    value: Mutex<Option<T>>,
}

impl<T> Slot<T> {
    fn new(label: String, value: T) -> Arc<Self> {
        Arc::new(Self {
            label,
            value: Mutex::new(Some(value)),
        })
    }

    fn take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Cloneable handle to one byte source. Clones share identity, so stages
/// referencing the same handle are wired to one consumer of the stream.
#[derive(Clone)]
pub struct SourceHandle {
    slot: Arc<Slot<ByteSource>>,
}

impl SourceHandle {
    pub fn new(label: impl Into<String>, reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            slot: Slot::new(label.into(), Box::new(reader)),
        }
    }

    pub fn label(&self) -> &str {
        &self.slot.label
    }

    /// Take the stream out. Only the first call gets it.
    pub fn take(&self) -> Option<ByteSource> {
        self.slot.take()
    }

    /// Same underlying stream
    pub fn same(&self, other: &SourceHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceHandle").field(&self.slot.label).finish()
    }
}

/// Cloneable handle to one byte sink, identity semantics as [`SourceHandle`]
#[derive(Clone)]
pub struct SinkHandle {
    slot: Arc<Slot<ByteSink>>,
}

impl SinkHandle {
    pub fn new(label: impl Into<String>, writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            slot: Slot::new(label.into(), Box::new(writer)),
        }
    }

    pub fn label(&self) -> &str {
        &self.slot.label
    }

    pub fn take(&self) -> Option<ByteSink> {
        self.slot.take()
    }

    pub fn same(&self, other: &SinkHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SinkHandle").field(&self.slot.label).finish()
    }
}
