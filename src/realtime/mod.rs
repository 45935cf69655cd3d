//! Real-time datagram capability
//!
//! The exchange session only needs "an unreliable, unordered, bidirectional
//! message channel opened through an offer/answer exchange". These traits
//! describe exactly that, so the session logic does not care which transport
//! carries the datagrams. [`udp`] provides the implementation used by the
//! server and the CLI client.

pub mod sdp;
pub mod udp;

pub use sdp::{Candidate, SdpMessage, SessionDescription};
pub use udp::{UdpChannel, UdpEchoEndpoint, UdpTransport};

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Largest datagram either side reads
pub const MAX_DATAGRAM: usize = 2048;

/// What a channel delivers next
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A datagram from the peer
    Message(Bytes),
    /// The channel was closed
    Closed,
    /// Connectivity to the peer failed or was lost
    Failed(String),
}

/// An open unreliable message channel
#[async_trait]
pub trait DatagramChannel: Send + Sync {
    /// Send one datagram; delivery is not guaranteed
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Wait for the next event. Must be cancel-safe: the session polls it
    /// alongside its send timer.
    async fn recv(&self) -> ChannelEvent;

    /// Close the channel; idempotent
    async fn close(&self);
}

/// Client half of the capability: produce an offer, consume the answer
#[async_trait]
pub trait RealtimeTransport: Send {
    /// Gather local candidates and describe them
    async fn create_offer(&mut self) -> Result<SessionDescription>;

    /// Apply the peer's answer and return the ready channel
    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<Box<dyn DatagramChannel>>;
}

/// Carries an offer to the peer and brings back its answer
#[async_trait]
pub trait Signaler: Send + Sync {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription>;
}

/// Server half of the capability: accept an offer and echo every datagram
/// received on the resulting channel back to its sender, unmodified.
#[async_trait]
pub trait EchoEndpoint: Send + Sync {
    async fn open(&self, offer: SessionDescription) -> Result<SessionDescription>;

    /// Number of echo sessions currently alive
    fn active_sessions(&self) -> usize;
}
