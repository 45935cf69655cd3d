//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// The four measurement steps of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTest {
    /// Repeated round trips against `/latency`
    Latency,
    /// Timed drain of `/download`
    Download,
    /// Timed body push to `/upload`
    Upload,
    /// Datagram echo exchange for jitter and packet loss
    Exchange,
}

impl SubTest {
    /// Get a human-readable name for this step
    pub fn name(&self) -> &'static str {
        match self {
            SubTest::Latency => "Latency",
            SubTest::Download => "Download",
            SubTest::Upload => "Upload",
            SubTest::Exchange => "Jitter/Loss",
        }
    }
}

impl fmt::Display for SubTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one measurement step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Step produced a value
    Success,
    /// Connection refused, timeout, disconnect mid-stream
    TransportFailed,
    /// Server answered with something the protocol does not allow
    ProtocolFailed,
    /// The real-time session could not be negotiated
    SetupFailed,
    /// Step did not run
    Skipped,
}

impl TestStatus {
    /// Classify an error into the status it leaves behind
    pub fn from_error(error: &AppError) -> Self {
        if error.is_protocol() {
            TestStatus::ProtocolFailed
        } else {
            TestStatus::TransportFailed
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestStatus::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Success => "ok",
            TestStatus::TransportFailed => "transport error",
            TestStatus::ProtocolFailed => "protocol error",
            TestStatus::SetupFailed => "setup failed",
            TestStatus::Skipped => "skipped",
        }
    }
}

/// Status line for one step, surfaced to the user next to the numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub step: SubTest,
    pub status: TestStatus,
    pub detail: Option<String>,
}

impl StepStatus {
    pub fn success(step: SubTest) -> Self {
        Self { step, status: TestStatus::Success, detail: None }
    }

    pub fn failed(step: SubTest, error: &AppError) -> Self {
        Self {
            step,
            status: TestStatus::from_error(error),
            detail: Some(error.to_string()),
        }
    }

    pub fn with_status(step: SubTest, status: TestStatus, detail: impl Into<String>) -> Self {
        Self { step, status, detail: Some(detail.into()) }
    }
}

/// Quality classification used to color measured values
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PerformanceLevel {
    Good,
    Moderate,
    Poor,
}

impl PerformanceLevel {
    /// Classify a round-trip latency in milliseconds
    pub fn from_latency_ms(ms: f64) -> Self {
        if ms < 50.0 {
            Self::Good
        } else if ms < 150.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }

    /// Classify a throughput in Mbps
    pub fn from_rate_mbps(mbps: f64) -> Self {
        if mbps >= 100.0 {
            Self::Good
        } else if mbps >= 10.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }

    /// Classify a packet loss percentage
    pub fn from_loss_pct(pct: f64) -> Self {
        if pct < 1.0 {
            Self::Good
        } else if pct < 5.0 {
            Self::Moderate
        } else {
            Self::Poor
        }
    }
}
