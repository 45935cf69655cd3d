//! Statistical analysis for speed test measurements
//!
//! Pure functions only: nothing in here touches the network or the clock.
//! The jitter/loss analyzer turns the samples collected by an exchange
//! session into the two numbers stored on a run, and the rate helpers turn
//! byte counts and elapsed times into Mbps.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Bytes per megabit in the rate formula (`bits / seconds / 1024²`)
pub const MEGABIT: f64 = 1024.0 * 1024.0;

/// Output of the jitter/loss analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterLossAnalysis {
    /// Packets actually dispatched
    pub dispatched: u32,
    /// Distinct echoes received
    pub received: usize,
    /// Loss percentage; `None` when nothing was dispatched
    pub packet_loss_pct: Option<f64>,
    /// Mean absolute delta between consecutive received RTTs
    pub jitter_ms: f64,
    /// Mean RTT over the received samples
    pub mean_rtt_ms: Option<f64>,
}

/// Analyze RTT samples (in arrival order) against the dispatched count
pub fn analyze(samples: &[f64], dispatched: u32) -> JitterLossAnalysis {
    let analysis = JitterLossAnalysis {
        dispatched,
        received: samples.len(),
        packet_loss_pct: packet_loss_percent(dispatched, samples.len()),
        jitter_ms: jitter(samples),
        mean_rtt_ms: mean(samples),
    };

    debug!(
        dispatched = analysis.dispatched,
        received = analysis.received,
        loss_pct = ?analysis.packet_loss_pct,
        jitter_ms = analysis.jitter_ms,
        "Jitter/loss analysis complete"
    );

    analysis
}

/// `(dispatched − received) / dispatched × 100`.
///
/// Undefined (`None`) for zero dispatched packets. More echoes than packets
/// can only come from a caller that did not de-duplicate; that case is
/// reported as 0 % with a warning instead of a negative loss.
pub fn packet_loss_percent(dispatched: u32, received: usize) -> Option<f64> {
    if dispatched == 0 {
        return None;
    }

    let dispatched_f = dispatched as f64;
    let loss = (dispatched_f - received as f64) / dispatched_f * 100.0;

    if loss < 0.0 {
        warn!(
            dispatched = dispatched,
            received = received,
            raw_loss_pct = loss,
            "More echoes than dispatched packets; reporting 0% loss"
        );
        return Some(0.0);
    }

    Some(loss)
}

/// Mean of `|s[i] − s[i−1]|` over consecutive samples; 0 with fewer than two
pub fn jitter(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }

    let total: f64 = samples
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .sum();

    total / (samples.len() - 1) as f64
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Transfer rate in Mbps; `None` when nothing moved or no time passed
pub fn throughput_mbps(bytes: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return None;
    }
    Some((bytes as f64 * 8.0) / secs / MEGABIT)
}

/// Spread of a set of latency samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub std_dev_ms: f64,
}

impl LatencySummary {
    /// Summarize samples; `None` when there are none
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        let mean_ms = mean(samples)?;
        let min_ms = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let variance = samples
            .iter()
            .map(|v| (v - mean_ms).powi(2))
            .sum::<f64>()
            / samples.len() as f64;

        Some(Self {
            count: samples.len(),
            mean_ms,
            min_ms,
            max_ms,
            std_dev_ms: variance.sqrt(),
        })
    }
}
