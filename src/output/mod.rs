//! Output formatting and display system
//!
//! Renders finished runs, the local history table and fetched result
//! records, either colored for terminals or plain for pipes and logs.

mod colored;
mod formatter;

pub use colored::{ColorScheme, ColoredFormatter};
pub use formatter::{format_loss, format_ms, format_rate, FormattingOptions, OutputFormatter, PlainFormatter, NOT_MEASURED};

use crate::{error::Result, executor::RunReport};
use serde::Serialize;

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, verbose: bool) -> Box<dyn OutputFormatter> {
        let options = FormattingOptions {
            enable_color,
            verbose_mode: verbose,
        };

        if enable_color {
            Box::new(ColoredFormatter::new(options))
        } else {
            Box::new(PlainFormatter::new(options))
        }
    }
}

/// Machine-readable document printed by `run --json`
#[derive(Debug, Serialize)]
pub struct JsonSummary<'a> {
    pub runs: &'a [RunReport],
    pub history: &'a [RunReport],
}

/// Render runs and history as pretty JSON
pub fn to_json(runs: &[RunReport], history: &[RunReport]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonSummary { runs, history })?)
}
