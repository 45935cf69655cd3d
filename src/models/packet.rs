//! Probe packets carried over the datagram echo channel

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A timestamped probe, echoed verbatim by the peer.
///
/// The timestamp is milliseconds on the sender's own monotonic clock, so the
/// round-trip time can be derived from the echo alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProbePacket {
    pub id: u32,
    pub timestamp: f64,
}

impl ProbePacket {
    pub fn new(id: u32, timestamp: f64) -> Self {
        Self { id, timestamp }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            debug!(len = bytes.len(), error = %e, "Undecodable probe packet");
            AppError::protocol(format!("Invalid probe packet: {}", e))
        })
    }

    /// Round-trip time in ms given the sender's current clock reading
    pub fn rtt_ms(&self, now_ms: f64) -> f64 {
        now_ms - self.timestamp
    }
}
