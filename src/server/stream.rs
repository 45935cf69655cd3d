//! Synthetic download body
//!
//! The content is irrelevant to the measurement, so every chunk is a slice of
//! one shared zero buffer. Each poll yields exactly one chunk, which hyper
//! writes out as its own frame.

use bytes::Bytes;
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info};

pub const MIB: u64 = 1024 * 1024;

/// Resolve the `size` query parameter to a size in MB.
///
/// Missing, unparsable, zero or negative values fall back to `default_mb`;
/// anything above `cap_mb` becomes `cap_mb`. The default is capped as well.
pub fn resolve_download_size(raw: Option<&str>, default_mb: u64, cap_mb: u64) -> u64 {
    let cap_mb = cap_mb.max(1);
    let requested = raw
        .and_then(|value| value.trim().parse::<i64>().ok())
        .filter(|&mb| mb > 0)
        .map(|mb| mb as u64);

    requested.unwrap_or(default_mb).clamp(1, cap_mb)
}

/// Stream of `total` zero bytes in `chunk_size` pieces
pub struct ChunkStream {
    chunk: Bytes,
    total: u64,
    sent: u64,
    chunks: u64,
}

impl ChunkStream {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            chunk: Bytes::from(vec![0u8; chunk_size.max(1)]),
            total,
            sent: 0,
            chunks: 0,
        }
    }

    /// Stream `size_mb` mebibytes
    pub fn megabytes(size_mb: u64, chunk_size: usize) -> Self {
        Self::new(size_mb * MIB, chunk_size)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.sent >= self.total
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let remaining = self.total - self.sent;
        if remaining == 0 {
            return Poll::Ready(None);
        }

        let len = remaining.min(self.chunk.len() as u64) as usize;
        let piece = self.chunk.slice(..len);
        self.sent += len as u64;
        self.chunks += 1;
        Poll::Ready(Some(Ok(piece)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let chunk = self.chunk.len() as u64;
        let left = (self.total - self.sent).div_ceil(chunk) as usize;
        (left, Some(left))
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        // Dropped early means the client went away mid-download
        if self.is_complete() {
            debug!(bytes = self.sent, chunks = self.chunks, "Download stream finished");
        } else {
            info!(
                sent = self.sent,
                total = self.total,
                "Download aborted by client"
            );
        }
    }
}
