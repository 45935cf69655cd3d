//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use std::net::IpAddr;
use std::path::Path;
use tracing::debug;

/// Value shape of a supported variable
#[derive(Debug, Clone, Copy, PartialEq)]
enum VarKind {
    Text,
    Port,
    Count,
    Bool,
    Ip,
    Url,
}

/// Name, kind, description
const SUPPORTED_VARS: &[(&str, VarKind, &str)] = &[
    ("SERVER_HOST", VarKind::Text, "Interface the server binds to"),
    ("SERVER_PORT", VarKind::Port, "TCP port of the server"),
    ("MAX_DOWNLOAD_MB", VarKind::Count, "Largest download served, in MB (1-1024)"),
    ("DEFAULT_DOWNLOAD_MB", VarKind::Count, "Download size when the request has none"),
    ("CHUNK_SIZE_BYTES", VarKind::Count, "Size of each streamed download chunk"),
    ("STATIC_DIR", VarKind::Text, "Directory with UI assets"),
    ("DATA_DIR", VarKind::Text, "Directory for saved results (empty keeps them in memory)"),
    ("UDP_PORT_MIN", VarKind::Port, "Lowest UDP port for echo sessions"),
    ("UDP_PORT_MAX", VarKind::Port, "Highest UDP port for echo sessions"),
    ("RTC_PUBLIC_IP", VarKind::Ip, "Address advertised to clients for echo sessions"),
    ("RTC_IDLE_TIMEOUT_SECS", VarKind::Count, "Idle echo sessions are closed after this many seconds"),
    ("RTC_MAX_SESSIONS", VarKind::Count, "Concurrent echo sessions before offers are refused"),
    ("SERVER_URL", VarKind::Url, "Server the client measures against"),
    ("LATENCY_PROBES", VarKind::Count, "Latency round trips per run (1-100)"),
    ("PROBE_GAP_MS", VarKind::Count, "Pause between latency probes"),
    ("DOWNLOAD_SIZE_MB", VarKind::Count, "Requested download size"),
    ("UPLOAD_SIZE_MB", VarKind::Count, "Upload size (capped to 100)"),
    ("PACKET_COUNT", VarKind::Count, "Probe packets per exchange (1-1000)"),
    ("PACKET_INTERVAL_MS", VarKind::Count, "Milliseconds between probe packets (1-1000)"),
    ("DRAIN_GRACE_MS", VarKind::Count, "Wait for late echoes after the last packet"),
    ("GATHER_TIMEOUT_SECS", VarKind::Count, "Upper bound for candidate gathering"),
    ("TIMEOUT_SECONDS", VarKind::Count, "HTTP request timeout (1-600)"),
    ("ENABLE_COLOR", VarKind::Bool, "Enable colored output"),
    ("LOG_FORMAT", VarKind::Text, "Log format: console, json or compact"),
];

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        Self::load_env_file_from(Path::new(".env"))
    }

    /// Load a specific env file; a missing file is not an error
    pub fn load_env_file_from(path: &Path) -> Result<()> {
        if path.exists() {
            dotenv::from_path(path)
                .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
            debug!(path = %path.display(), "Loaded environment file");
        } else {
            debug!(path = %path.display(), "No environment file, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        let Some((_, kind, _)) = SUPPORTED_VARS.iter().find(|(name, ..)| *name == key) else {
            // Unknown variable, ignore
            return Ok(());
        };
        let value = value.trim();

        match kind {
            VarKind::Text => Ok(()),
            VarKind::Port => check(key, value, value.parse::<u16>()),
            VarKind::Count => check(key, value, value.parse::<u64>()),
            VarKind::Bool => check(key, value, value.parse::<bool>()),
            VarKind::Ip => check(key, value, value.parse::<IpAddr>()),
            VarKind::Url => check(key, value, url::Url::parse(value)),
        }
    }

    /// Problems with the currently set variables, one line each
    pub fn validate_current_env() -> Vec<String> {
        SUPPORTED_VARS
            .iter()
            .filter_map(|(name, _, description)| {
                let value = std::env::var(name).ok()?;
                Self::validate_env_var(name, &value)
                    .err()
                    .map(|e| format!("{} ({})", e, description.to_lowercase()))
            })
            .collect()
    }
}

fn check<T, E: std::fmt::Display>(key: &str, value: &str, parsed: std::result::Result<T, E>) -> Result<()> {
    parsed
        .map(|_| ())
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}
