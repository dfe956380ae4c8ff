//! Sample-then-replay reader

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Reader that records everything read from `inner` until [`arm`] is called,
/// then serves the recorded bytes once, in order, before reading `inner`
/// again.
///
/// Lets a sampling stage (the prober) and a later consumer share one fetch.
/// Single consumer only.
///
/// [`arm`]: ReplayReader::arm
pub struct ReplayReader<R> {
    inner: R,
    buffer: Vec<u8>,
    armed: bool,
    position: usize,
}

impl<R> ReplayReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            armed: false,
            position: 0,
        }
    }

    /// Switch to replay mode. Later calls do nothing.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Bytes recorded and not yet replayed
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ReplayReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.armed {
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            this.buffer.extend_from_slice(&buf.filled()[before..]);
            return Poll::Ready(Ok(()));
        }

        if this.position < this.buffer.len() {
            let n = buf.remaining().min(this.buffer.len() - this.position);
            buf.put_slice(&this.buffer[this.position..this.position + n]);
            this.position += n;
            if this.position == this.buffer.len() {
                this.buffer = Vec::new();
                this.position = 0;
            }
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}
