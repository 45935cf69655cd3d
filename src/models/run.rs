//! Measurement run and persisted result record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Values gathered during one full test cycle.
///
/// Every field is either a finite measurement or `None` ("not measured");
/// NaN and infinities never make it in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRun {
    /// Mean round-trip time in milliseconds
    #[serde(default)]
    pub latency: Option<f64>,

    /// Download rate in Mbps
    #[serde(default)]
    pub download: Option<f64>,

    /// Upload rate in Mbps
    #[serde(default)]
    pub upload: Option<f64>,

    /// Mean absolute RTT delta in milliseconds
    #[serde(default)]
    pub jitter: Option<f64>,

    /// Lost probe packets in percent
    #[serde(default)]
    pub packet_loss: Option<f64>,
}

impl MeasurementRun {
    /// Create a run with every field "not measured"
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset all fields to "not measured"
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn set_latency(&mut self, value: Option<f64>) {
        self.latency = finite(value);
    }

    pub fn set_download(&mut self, value: Option<f64>) {
        self.download = finite(value);
    }

    pub fn set_upload(&mut self, value: Option<f64>) {
        self.upload = finite(value);
    }

    pub fn set_jitter(&mut self, value: Option<f64>) {
        self.jitter = finite(value);
    }

    pub fn set_packet_loss(&mut self, value: Option<f64>) {
        self.packet_loss = finite(value);
    }

    /// Number of fields holding a value
    pub fn measured_count(&self) -> usize {
        [self.latency, self.download, self.upload, self.jitter, self.packet_loss]
            .iter()
            .filter(|v| v.is_some())
            .count()
    }

    /// True when at least one step produced a value
    pub fn has_any_measurement(&self) -> bool {
        self.measured_count() > 0
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Immutable persisted snapshot of a completed run.
///
/// `id` and `timestamp` are assigned by the server when the record is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,

    #[serde(flatten)]
    pub run: MeasurementRun,

    pub timestamp: DateTime<Utc>,
}

impl ResultRecord {
    /// Snapshot a run under a freshly assigned id
    pub fn new(id: String, run: MeasurementRun) -> Self {
        Self {
            id,
            run,
            timestamp: Utc::now(),
        }
    }
}

/// Response body of `/save-result`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub status: String,
    pub id: String,
}

impl SaveResponse {
    pub fn success(id: String) -> Self {
        Self {
            status: "success".to_string(),
            id,
        }
    }
}
