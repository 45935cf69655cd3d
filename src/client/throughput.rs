//! Client half of the throughput measurement

use crate::defaults;
use crate::error::{AppError, Result};
use crate::stats;
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

pub const MIB: u64 = 1024 * 1024;

/// Piece size of the generated upload body
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Bytes moved and the wall-clock time it took
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl TransferResult {
    pub fn new(bytes: u64, elapsed: Duration) -> Self {
        Self { bytes, elapsed }
    }

    /// Rate in Mbps on the 1024² scale; `None` if nothing measurable happened
    pub fn mbps(&self) -> Option<f64> {
        stats::throughput_mbps(self.bytes, self.elapsed)
    }
}

/// Upload sizes are clamped to `1..=100` MB, never rejected
pub fn clamp_upload_mb(size_mb: u64) -> u64 {
    size_mb.clamp(1, defaults::MAX_UPLOAD_MB)
}

/// Drain a download response incrementally, timing from `start`
pub async fn drain_response(response: reqwest::Response, start: Instant) -> Result<TransferResult> {
    let mut stream = response.bytes_stream();
    let mut total: u64 = 0;
    let mut chunks: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::network(format!("download interrupted after {} bytes: {}", total, e)))?;
        total += chunk.len() as u64;
        chunks += 1;
    }
    let elapsed = start.elapsed();

    if total == 0 {
        return Err(AppError::protocol("zero bytes received"));
    }

    debug!(bytes = total, chunks, elapsed_ms = elapsed.as_millis() as u64, "Download drained");
    Ok(TransferResult::new(total, elapsed))
}

/// Streaming body of `total` zero bytes
pub fn upload_body(total: u64) -> reqwest::Body {
    let chunk = Bytes::from(vec![0u8; UPLOAD_CHUNK]);
    let full = total / UPLOAD_CHUNK as u64;
    let tail = (total % UPLOAD_CHUNK as u64) as usize;

    let pieces = std::iter::repeat(chunk.clone())
        .take(full as usize)
        .chain((tail > 0).then(|| chunk.slice(..tail)))
        .map(Ok::<Bytes, std::io::Error>);

    reqwest::Body::wrap_stream(futures::stream::iter(pieces))
}
