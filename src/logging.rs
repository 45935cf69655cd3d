//! Structured logging setup for the network speed tester
//!
//! All components log through `tracing`; this module decides where the
//! events go and how they look:
//! - Level derived from `--debug` / `--verbose`, overridable with `RUST_LOG`
//! - Installed before the configuration loads, so config loading is logged
//! - Console, compact or JSON output
//! - A per-run span carrying the run's correlation id

use crate::cli::Cli;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Log level enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    /// Trace level - most detailed
    Trace = 0,
    /// Debug level - detailed information for debugging
    Debug = 1,
    /// Info level - general application information
    Info = 2,
    /// Warning level - potentially harmful situations
    Warn = 3,
    /// Error level - error events but application can continue
    Error = 4,
}

impl LogLevel {
    /// Get log level name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    /// Pick the level implied by `--debug` / `--verbose`
    pub fn from_flags(debug: bool, verbose: bool) -> Self {
        if debug {
            LogLevel::Debug
        } else if verbose {
            LogLevel::Info
        } else {
            LogLevel::Warn
        }
    }

    fn directive(&self) -> String {
        format!("{}={}", env!("CARGO_CRATE_NAME"), self.as_str().to_lowercase())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            _ => Err(AppError::parse(format!("Invalid log level: {}", s))),
        }
    }
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console format
    Console,
    /// JSON format for structured logging
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "console" | "pretty" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(AppError::config(format!("Invalid log format: {}", s))),
        }
    }
}

/// Install the global subscriber.
///
/// `default_level` applies to this crate only; `RUST_LOG` replaces the whole
/// filter when set. A second call is a no-op so tests may call it freely.
pub fn init(default_level: LogLevel, format: LogFormat, use_color: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,{}", default_level.directive())));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = match format {
        LogFormat::Console => builder.with_ansi(use_color).try_init(),
        LogFormat::Compact => builder.compact().with_ansi(use_color).try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}

/// Install the subscriber from the command line and the process environment.
///
/// Runs before the configuration is assembled so that loading it is logged
/// too. `--log-format` wins over `LOG_FORMAT`; `ENABLE_COLOR=false` turns
/// ANSI off like `--no-color` does.
pub fn init_from_cli(cli: &Cli) -> Result<()> {
    let env_format = std::env::var("LOG_FORMAT").ok();
    let format = resolve_format(cli.log_format.as_deref(), env_format.as_deref())?;
    let env_color = std::env::var("ENABLE_COLOR")
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(true);

    init(LogLevel::from_flags(cli.debug, cli.verbose), format, cli.use_colors() && env_color);
    Ok(())
}

fn resolve_format(cli_format: Option<&str>, env_format: Option<&str>) -> Result<LogFormat> {
    cli_format.or(env_format).map_or(Ok(LogFormat::Console), |f| f.trim().parse())
}

/// Span grouping every event of one measurement run
pub fn run_span(run_id: &Uuid) -> Span {
    tracing::info_span!("measurement_run", run_id = %run_id)
}
