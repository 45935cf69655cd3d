//! Network Speed Tester
//!
//! Measures latency, download/upload throughput, jitter and packet loss
//! between a test server and a client. The server exposes a small HTTP API
//! plus an unreliable datagram echo channel; the client drives the timed
//! exchanges and aggregates them into a shareable result record.

pub mod app;
pub mod cli;
pub mod config;
pub mod client;
pub mod error;
pub mod logging;
pub mod stats;
pub mod executor;
pub mod output;
pub mod models;
pub mod realtime;
pub mod server;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, MeasurementRun, ProbePacket, ResultRecord};
pub use stats::JitterLossAnalysis;
pub use executor::{RunReport, SessionContext, TestRunner};
pub use output::{OutputFormatter, ColoredFormatter, PlainFormatter, OutputFormatterFactory};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");
pub const GIT_COMMIT: Option<&str> = option_env!("GIT_COMMIT");

/// One-line build description for logs
pub fn build_info() -> String {
    format!(
        "{} {} ({}, {}, built {})",
        PKG_NAME,
        VERSION,
        GIT_COMMIT.unwrap_or("unknown commit"),
        TARGET_TRIPLE,
        BUILD_TIME
    )
}

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
    pub const DEFAULT_SERVER_PORT: u16 = 8080;
    pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

    /// Absolute ceiling for a single download, whatever the configuration says
    pub const HARD_MAX_DOWNLOAD_MB: u64 = 1024;
    pub const DEFAULT_MAX_DOWNLOAD_MB: u64 = 100;
    pub const DEFAULT_DOWNLOAD_MB: u64 = 50;
    pub const DEFAULT_CHUNK_SIZE: usize = 4096;
    pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

    /// Request body limit for `/save-result`
    pub const SAVE_BODY_LIMIT: usize = 1024 * 1024;

    pub const DEFAULT_STATIC_DIR: &str = "static";
    pub const DEFAULT_DATA_DIR: &str = "results";
    pub const DEFAULT_RTC_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_RTC_MAX_SESSIONS: usize = 64;

    pub const DEFAULT_LATENCY_PROBES: u32 = 10;
    pub const DEFAULT_PROBE_GAP: Duration = Duration::from_millis(100);
    pub const DEFAULT_CLIENT_DOWNLOAD_MB: u64 = 10;
    pub const DEFAULT_CLIENT_UPLOAD_MB: u64 = 10;
    pub const MAX_UPLOAD_MB: u64 = 100;

    pub const DEFAULT_PACKET_COUNT: u32 = 100;
    pub const DEFAULT_PACKET_INTERVAL: Duration = Duration::from_millis(40);
    pub const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(1500);
    pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(5);

    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_ENABLE_COLOR: bool = true;

    /// Number of completed runs kept in the local history
    pub const HISTORY_CAPACITY: usize = 5;
}
