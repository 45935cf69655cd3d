//! Configuration data model and validation

use crate::defaults;
use crate::types::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration, shared by the server and the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface the HTTP listener binds to
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// TCP port of the HTTP listener
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Largest download the server will stream, in MB (never above the hard ceiling)
    #[serde(default = "default_max_download_mb")]
    pub max_download_mb: u64,

    /// Size streamed when a download request carries no usable size
    #[serde(default = "default_download_mb")]
    pub default_download_mb: u64,

    /// Size of each streamed download chunk in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Directory with UI assets served at `/`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,

    /// Directory for persisted result records; `None` keeps them in memory
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Optional UDP port range for echo sessions
    #[serde(default)]
    pub udp_port_min: Option<u16>,
    #[serde(default)]
    pub udp_port_max: Option<u16>,

    /// Address advertised in session answers instead of the bound address
    #[serde(default)]
    pub rtc_public_ip: Option<IpAddr>,

    /// Echo sessions without traffic for this long are torn down
    #[serde(default = "default_rtc_idle_secs")]
    pub rtc_idle_timeout_secs: u64,

    /// Concurrent echo sessions the server accepts before refusing offers
    #[serde(default = "default_rtc_max_sessions")]
    pub rtc_max_sessions: usize,

    /// Base URL of the server the client measures against
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Number of latency round trips per run
    #[serde(default = "default_latency_probes")]
    pub latency_probes: u32,

    /// Pause between consecutive latency probes
    #[serde(default = "default_probe_gap_ms")]
    pub probe_gap_ms: u64,

    /// Requested download size in MB
    #[serde(default = "default_client_download_mb")]
    pub download_size_mb: u64,

    /// Upload body size in MB
    #[serde(default = "default_client_upload_mb")]
    pub upload_size_mb: u64,

    /// Probe packets sent by the exchange session
    #[serde(default = "default_packet_count")]
    pub packet_count: u32,

    /// Interval between probe packets
    #[serde(default = "default_packet_interval_ms")]
    pub packet_interval_ms: u64,

    /// Extra wait for late echoes after the last packet
    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,

    /// Upper bound for candidate gathering
    #[serde(default = "default_gather_timeout_secs")]
    pub gather_timeout_secs: u64,

    /// Per-request timeout for the HTTP client
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// Submit each finished run to the server's result store
    #[serde(default = "default_true")]
    pub save_results: bool,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Log output format name (console, json, compact)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            server_port: default_server_port(),
            max_download_mb: default_max_download_mb(),
            default_download_mb: default_download_mb(),
            chunk_size: default_chunk_size(),
            static_dir: default_static_dir(),
            data_dir: None,
            udp_port_min: None,
            udp_port_max: None,
            rtc_public_ip: None,
            rtc_idle_timeout_secs: default_rtc_idle_secs(),
            rtc_max_sessions: default_rtc_max_sessions(),
            server_url: default_server_url(),
            latency_probes: default_latency_probes(),
            probe_gap_ms: default_probe_gap_ms(),
            download_size_mb: default_client_download_mb(),
            upload_size_mb: default_client_upload_mb(),
            packet_count: default_packet_count(),
            packet_interval_ms: default_packet_interval_ms(),
            drain_grace_ms: default_drain_grace_ms(),
            gather_timeout_secs: default_gather_timeout_secs(),
            timeout_seconds: default_timeout_secs(),
            save_results: true,
            enable_color: default_enable_color(),
            log_format: default_log_format(),
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Effective download cap: the configured maximum, never above the hard ceiling
    pub fn download_cap_mb(&self) -> u64 {
        self.max_download_mb.min(defaults::HARD_MAX_DOWNLOAD_MB).max(1)
    }

    /// Optional UDP port range as an inclusive pair
    pub fn udp_port_range(&self) -> Option<(u16, u16)> {
        match (self.udp_port_min, self.udp_port_max) {
            (Some(min), Some(max)) => Some((min, max)),
            (Some(min), None) => Some((min, u16::MAX)),
            (None, Some(max)) => Some((1, max)),
            (None, None) => None,
        }
    }

    pub fn probe_gap(&self) -> Duration {
        Duration::from_millis(self.probe_gap_ms)
    }

    pub fn packet_interval(&self) -> Duration {
        Duration::from_millis(self.packet_interval_ms)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_millis(self.drain_grace_ms)
    }

    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    pub fn rtc_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.rtc_idle_timeout_secs)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        if self.server_host.is_empty() {
            return Err(AppError::config("Server host cannot be empty"));
        }

        if IpAddr::from_str(&self.server_host).is_err() && self.server_host != "localhost" {
            return Err(AppError::config(format!("Invalid server host: {}", self.server_host)));
        }

        if self.max_download_mb == 0 || self.max_download_mb > defaults::HARD_MAX_DOWNLOAD_MB {
            return Err(AppError::config(format!(
                "Maximum download size must be between 1 and {} MB",
                defaults::HARD_MAX_DOWNLOAD_MB
            )));
        }

        if self.default_download_mb == 0 {
            return Err(AppError::config("Default download size must be greater than 0"));
        }

        if self.chunk_size == 0 || self.chunk_size > defaults::MAX_CHUNK_SIZE {
            return Err(AppError::config(format!(
                "Chunk size must be between 1 and {} bytes",
                defaults::MAX_CHUNK_SIZE
            )));
        }

        if let (Some(min), Some(max)) = (self.udp_port_min, self.udp_port_max) {
            if min > max {
                return Err(AppError::config(format!("UDP port range is empty: {}-{}", min, max)));
            }
        }

        if self.rtc_idle_timeout_secs == 0 {
            return Err(AppError::config("Echo session idle timeout must be greater than 0"));
        }

        if self.rtc_max_sessions == 0 {
            return Err(AppError::config("Echo session limit must be greater than 0"));
        }

        match url::Url::parse(&self.server_url) {
            Ok(parsed) => {
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(AppError::config(format!("Server URL must use http or https: {}", self.server_url)));
                }
            }
            Err(e) => {
                return Err(AppError::config(format!("Invalid server URL '{}': {}", self.server_url, e)));
            }
        }

        if self.latency_probes == 0 || self.latency_probes > 100 {
            return Err(AppError::config("Latency probe count must be between 1 and 100"));
        }

        if self.download_size_mb == 0 || self.upload_size_mb == 0 {
            return Err(AppError::config("Transfer sizes must be greater than 0"));
        }

        if self.packet_count == 0 || self.packet_count > 1000 {
            return Err(AppError::config("Packet count must be between 1 and 1000"));
        }

        if self.packet_interval_ms == 0 || self.packet_interval_ms > 1000 {
            return Err(AppError::config("Packet interval must be between 1 and 1000 ms"));
        }

        if self.gather_timeout_secs == 0 {
            return Err(AppError::config("Gather timeout must be greater than 0"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 600 {
            return Err(AppError::config("Timeout cannot exceed 600 seconds"));
        }

        crate::logging::LogFormat::from_str(&self.log_format)?;

        Ok(())
    }

    /// Merge environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server_host = host.trim().to_string();
        }

        if let Some(port) = env_parse("SERVER_PORT")? {
            self.server_port = port;
        }

        if let Some(max) = env_parse("MAX_DOWNLOAD_MB")? {
            self.max_download_mb = max;
        }

        if let Some(size) = env_parse("DEFAULT_DOWNLOAD_MB")? {
            self.default_download_mb = size;
        }

        if let Some(chunk) = env_parse("CHUNK_SIZE_BYTES")? {
            self.chunk_size = chunk;
        }

        if let Ok(dir) = std::env::var("STATIC_DIR") {
            self.static_dir = PathBuf::from(dir.trim());
        }

        if let Ok(dir) = std::env::var("DATA_DIR") {
            let dir = dir.trim();
            self.data_dir = if dir.is_empty() { None } else { Some(PathBuf::from(dir)) };
        }

        if let Some(min) = env_parse("UDP_PORT_MIN")? {
            self.udp_port_min = Some(min);
        }

        if let Some(max) = env_parse("UDP_PORT_MAX")? {
            self.udp_port_max = Some(max);
        }

        if let Some(ip) = env_parse("RTC_PUBLIC_IP")? {
            self.rtc_public_ip = Some(ip);
        }

        if let Some(secs) = env_parse("RTC_IDLE_TIMEOUT_SECS")? {
            self.rtc_idle_timeout_secs = secs;
        }

        if let Some(limit) = env_parse("RTC_MAX_SESSIONS")? {
            self.rtc_max_sessions = limit;
        }

        if let Ok(url) = std::env::var("SERVER_URL") {
            self.server_url = url.trim().to_string();
        }

        if let Some(probes) = env_parse("LATENCY_PROBES")? {
            self.latency_probes = probes;
        }

        if let Some(gap) = env_parse("PROBE_GAP_MS")? {
            self.probe_gap_ms = gap;
        }

        if let Some(size) = env_parse("DOWNLOAD_SIZE_MB")? {
            self.download_size_mb = size;
        }

        if let Some(size) = env_parse("UPLOAD_SIZE_MB")? {
            self.upload_size_mb = size;
        }

        if let Some(count) = env_parse("PACKET_COUNT")? {
            self.packet_count = count;
        }

        if let Some(interval) = env_parse("PACKET_INTERVAL_MS")? {
            self.packet_interval_ms = interval;
        }

        if let Some(grace) = env_parse("DRAIN_GRACE_MS")? {
            self.drain_grace_ms = grace;
        }

        if let Some(secs) = env_parse("GATHER_TIMEOUT_SECS")? {
            self.gather_timeout_secs = secs;
        }

        if let Some(timeout) = env_parse("TIMEOUT_SECONDS")? {
            self.timeout_seconds = timeout;
        }

        if let Some(enable_color) = env_parse("ENABLE_COLOR")? {
            self.enable_color = enable_color;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.log_format = format.trim().to_lowercase();
        }

        Ok(())
    }
}

/// Read and parse an environment variable, reporting the variable name on failure
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e))),
        Err(_) => Ok(None),
    }
}

// Default value functions for serde
fn default_server_host() -> String {
    defaults::DEFAULT_SERVER_HOST.to_string()
}

fn default_server_port() -> u16 {
    defaults::DEFAULT_SERVER_PORT
}

fn default_max_download_mb() -> u64 {
    defaults::DEFAULT_MAX_DOWNLOAD_MB
}

fn default_download_mb() -> u64 {
    defaults::DEFAULT_DOWNLOAD_MB
}

fn default_chunk_size() -> usize {
    defaults::DEFAULT_CHUNK_SIZE
}

fn default_static_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_STATIC_DIR)
}

fn default_rtc_idle_secs() -> u64 {
    defaults::DEFAULT_RTC_IDLE_TIMEOUT.as_secs()
}

fn default_rtc_max_sessions() -> usize {
    defaults::DEFAULT_RTC_MAX_SESSIONS
}

fn default_server_url() -> String {
    defaults::DEFAULT_SERVER_URL.to_string()
}

fn default_latency_probes() -> u32 {
    defaults::DEFAULT_LATENCY_PROBES
}

fn default_probe_gap_ms() -> u64 {
    defaults::DEFAULT_PROBE_GAP.as_millis() as u64
}

fn default_client_download_mb() -> u64 {
    defaults::DEFAULT_CLIENT_DOWNLOAD_MB
}

fn default_client_upload_mb() -> u64 {
    defaults::DEFAULT_CLIENT_UPLOAD_MB
}

fn default_packet_count() -> u32 {
    defaults::DEFAULT_PACKET_COUNT
}

fn default_packet_interval_ms() -> u64 {
    defaults::DEFAULT_PACKET_INTERVAL.as_millis() as u64
}

fn default_drain_grace_ms() -> u64 {
    defaults::DEFAULT_DRAIN_GRACE.as_millis() as u64
}

fn default_gather_timeout_secs() -> u64 {
    defaults::DEFAULT_GATHER_TIMEOUT.as_secs()
}

fn default_timeout_secs() -> u64 {
    defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_true() -> bool {
    true
}

fn default_enable_color() -> bool {
    defaults::DEFAULT_ENABLE_COLOR
}

fn default_log_format() -> String {
    "console".to_string()
}
