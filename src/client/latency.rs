//! Timing probe: repeated round trips to `/latency`

use super::HttpClient;
use crate::error::{AppError, Result};
use crate::models::Config;
use crate::stats::{self, LatencySummary};
use std::time::Duration;
use tracing::{debug, warn};

/// Issues `count` independent round trips separated by `gap`
#[derive(Debug, Clone)]
pub struct LatencyProbe {
    count: u32,
    gap: Duration,
}

/// Successful round trips of one probe series
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyOutcome {
    pub samples_ms: Vec<f64>,
    pub attempted: u32,
}

impl LatencyOutcome {
    /// Mean round-trip time; the outcome always holds at least one sample
    pub fn mean_ms(&self) -> f64 {
        stats::mean(&self.samples_ms).unwrap_or_default()
    }

    pub fn failures(&self) -> u32 {
        self.attempted - self.samples_ms.len() as u32
    }

    pub fn summary(&self) -> Option<LatencySummary> {
        LatencySummary::from_samples(&self.samples_ms)
    }
}

impl LatencyProbe {
    pub fn new(count: u32, gap: Duration) -> Self {
        Self { count: count.max(1), gap }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.latency_probes, config.probe_gap())
    }

    /// Run the series. Failed trips are dropped; only a series without a single
    /// success is an error, carrying the last failure.
    pub async fn run(&self, client: &dyn HttpClient) -> Result<LatencyOutcome> {
        let mut samples_ms = Vec::with_capacity(self.count as usize);
        let mut last_error = None;

        for i in 0..self.count {
            if i > 0 && !self.gap.is_zero() {
                tokio::time::sleep(self.gap).await;
            }

            match client.ping().await {
                Ok(rtt) => {
                    let ms = rtt.as_secs_f64() * 1000.0;
                    debug!(probe = i, rtt_ms = ms, "Latency probe");
                    samples_ms.push(ms);
                }
                Err(e) => {
                    debug!(probe = i, error = %e, "Latency probe failed");
                    last_error = Some(e);
                }
            }
        }

        if samples_ms.is_empty() {
            warn!(attempted = self.count, "Every latency probe failed");
            return Err(last_error.unwrap_or_else(|| AppError::test_execution("no latency probes were run")));
        }

        Ok(LatencyOutcome {
            samples_ms,
            attempted: self.count,
        })
    }
}
