//! Real-time exchange session
//!
//! Sends a batch of timestamped probe packets over an unreliable datagram
//! channel and collects the echoes:
//!
//! ```text
//! Negotiating ──► Open ──► Sending ──► Draining ──► Closed
//!      │                      │            │
//!      └── setup failure ─────┴────────────┴──► Closed
//! ```
//!
//! Sending and receiving are two arms of one `select!` loop, so the sent
//! counter and the sample list are only ever touched by this task. Whatever
//! ends the loop, the send timer is dropped before the channel is closed and
//! the analysis runs exactly once.

use crate::error::Result;
use crate::models::{Config, ProbePacket};
use crate::realtime::{ChannelEvent, DatagramChannel, RealtimeTransport, Signaler};
use crate::stats::{self, JitterLossAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Negotiating,
    Open,
    Sending,
    Draining,
    Closed,
}

/// Why the session reached `Closed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum TerminalReason {
    AllEchoesReceived,
    GracePeriodElapsed,
    ChannelClosed,
    ConnectivityFailed(String),
    SetupFailed(String),
}

impl TerminalReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ConnectivityFailed(_) | Self::SetupFailed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub packet_count: u32,
    pub interval: Duration,
    pub drain_grace: Duration,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            packet_count: config.packet_count,
            interval: config.packet_interval(),
            drain_grace: config.drain_grace(),
        }
    }

    /// Upper bound of Sending + Draining, measured from the first send
    pub fn exchange_window(&self) -> Duration {
        self.interval * self.packet_count + self.drain_grace
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything a finished session produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub state: SessionState,
    pub reason: TerminalReason,
    pub sent: u32,
    /// RTTs in arrival order
    pub samples_ms: Vec<f64>,
    pub duplicates: u32,
    /// Datagrams that were not an echo of a sent probe
    pub stray: u32,
    /// `None` when the channel never opened
    pub analysis: Option<JitterLossAnalysis>,
}

/// Probe bookkeeping shared by the send and receive arms
#[derive(Debug, Default)]
struct Tally {
    sent: u32,
    seen: HashSet<u32>,
    samples_ms: Vec<f64>,
    duplicates: u32,
    stray: u32,
}

impl Tally {
    fn record_echo(&mut self, payload: &[u8], now_ms: f64) {
        let packet = match ProbePacket::decode(payload) {
            Ok(packet) => packet,
            Err(_) => {
                self.stray += 1;
                return;
            }
        };

        if packet.id >= self.sent {
            debug!(id = packet.id, sent = self.sent, "Echo for a packet never sent");
            self.stray += 1;
        } else if !self.seen.insert(packet.id) {
            self.duplicates += 1;
        } else {
            self.samples_ms.push(packet.rtt_ms(now_ms));
        }
    }

    fn received(&self) -> usize {
        self.samples_ms.len()
    }
}

pub struct ExchangeSession {
    config: SessionConfig,
    state: SessionState,
    epoch: Instant,
}

impl ExchangeSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Negotiating,
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Exchange session state");
        self.state = next;
    }

    /// Milliseconds on the session's monotonic clock
    fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    /// Negotiate a channel, run the exchange and report. Never fails: every
    /// outcome, including a failed negotiation, ends in a report.
    pub async fn run(mut self, transport: &mut dyn RealtimeTransport, signaler: &dyn Signaler) -> SessionReport {
        let channel = match Self::negotiate(transport, signaler).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(error = %e, "Exchange session setup failed");
                return self.finish(TerminalReason::SetupFailed(e.to_string()), Tally::default(), false);
            }
        };
        self.transition(SessionState::Open);

        let (reason, tally) = self.exchange(channel.as_ref()).await;
        channel.close().await;

        self.finish(reason, tally, true)
    }

    async fn negotiate(
        transport: &mut dyn RealtimeTransport,
        signaler: &dyn Signaler,
    ) -> Result<Box<dyn DatagramChannel>> {
        let offer = transport.create_offer().await?;
        debug!(candidates = offer.candidates.len(), "Offer created");
        let answer = signaler.exchange(&offer).await?;
        transport.apply_answer(answer).await
    }

    async fn exchange(&mut self, channel: &dyn DatagramChannel) -> (TerminalReason, Tally) {
        let count = self.config.packet_count;
        let mut tally = Tally::default();

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = tokio::time::sleep(self.config.exchange_window());
        tokio::pin!(deadline);

        self.transition(SessionState::Sending);

        let reason = loop {
            tokio::select! {
                _ = ticker.tick(), if tally.sent < count => {
                    let packet = ProbePacket::new(tally.sent, self.now_ms());
                    let payload = match packet.encode() {
                        Ok(payload) => payload,
                        Err(e) => break TerminalReason::ConnectivityFailed(e.to_string()),
                    };
                    if let Err(e) = channel.send(&payload).await {
                        break TerminalReason::ConnectivityFailed(e.to_string());
                    }
                    tally.sent += 1;
                    if tally.sent == count {
                        self.transition(SessionState::Draining);
                    }
                }
                event = channel.recv() => match event {
                    ChannelEvent::Message(bytes) => {
                        tally.record_echo(&bytes, self.now_ms());
                        if tally.received() == count as usize {
                            break TerminalReason::AllEchoesReceived;
                        }
                    }
                    ChannelEvent::Closed => break TerminalReason::ChannelClosed,
                    ChannelEvent::Failed(detail) => break TerminalReason::ConnectivityFailed(detail),
                },
                _ = &mut deadline => break TerminalReason::GracePeriodElapsed,
            }
        };

        // Stop the send timer before anything closes the channel
        drop(ticker);
        (reason, tally)
    }

    fn finish(mut self, reason: TerminalReason, tally: Tally, opened: bool) -> SessionReport {
        self.transition(SessionState::Closed);

        let analysis = opened.then(|| stats::analyze(&tally.samples_ms, tally.sent));

        info!(
            reason = ?reason,
            sent = tally.sent,
            received = tally.received(),
            duplicates = tally.duplicates,
            "Exchange session closed"
        );

        SessionReport {
            state: self.state,
            reason,
            sent: tally.sent,
            samples_ms: tally.samples_ms,
            duplicates: tally.duplicates,
            stray: tally.stray,
            analysis,
        }
    }
}
