//! Colored formatter implementation with terminal color support
//!
//! Measured values are colored by their performance level, step status by
//! outcome. Layout is shared with the plain formatter.

use super::formatter::{
    format_loss, format_ms, format_rate, metric_rows, status_text, FormattingOptions, OutputFormatter, PlainFormatter,
};
use crate::{
    error::Result,
    executor::RunReport,
    models::{MeasurementRun, ResultRecord},
    types::{PerformanceLevel, SubTest},
};
use colored::*;
use std::fmt::Write as _;

/// Color scheme configuration
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub header: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
    pub info: Color,
    pub highlight: Color,
    pub muted: Color,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            header: Color::Blue,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
            info: Color::Cyan,
            highlight: Color::Magenta,
            muted: Color::BrightBlack,
        }
    }
}

impl ColorScheme {
    fn level(&self, level: PerformanceLevel) -> Color {
        match level {
            PerformanceLevel::Good => self.success,
            PerformanceLevel::Moderate => self.warning,
            PerformanceLevel::Poor => self.error,
        }
    }
}

/// Rich formatter with ANSI colors
pub struct ColoredFormatter {
    options: FormattingOptions,
    color_scheme: ColorScheme,
    plain_formatter: PlainFormatter,
}

impl ColoredFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self {
            plain_formatter: PlainFormatter::new(options.clone()),
            options,
            color_scheme: ColorScheme::default(),
        }
    }

    fn colorize(&self, text: &str, color: Color) -> String {
        if self.options.enable_color {
            text.color(color).to_string()
        } else {
            text.to_string()
        }
    }

    /// Level of each displayed quantity, in `metric_rows` order
    fn levels(run: &MeasurementRun) -> [Option<PerformanceLevel>; 5] {
        [
            run.latency.map(PerformanceLevel::from_latency_ms),
            run.download.map(PerformanceLevel::from_rate_mbps),
            run.upload.map(PerformanceLevel::from_rate_mbps),
            run.jitter.map(PerformanceLevel::from_latency_ms),
            run.packet_loss.map(PerformanceLevel::from_loss_pct),
        ]
    }

    fn value_cell(&self, value: &str, width: usize, level: Option<PerformanceLevel>) -> String {
        // Pad before coloring, escape codes would break the alignment
        let padded = format!("{:>width$}", value, width = width);
        match level {
            Some(level) => self.colorize(&padded, self.color_scheme.level(level)),
            None => self.colorize(&padded, self.color_scheme.muted),
        }
    }

    fn status_cell(&self, report: &RunReport, step: SubTest) -> String {
        let status = report.step(step);
        let text = status_text(status);
        match status {
            Some(s) if s.status.is_success() => self.colorize(&text, self.color_scheme.success),
            Some(_) => self.colorize(&text, self.color_scheme.error),
            None => self.colorize(&text, self.color_scheme.muted),
        }
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        let line = "═".repeat(title.chars().count());
        Ok(format!(
            "{}\n{}",
            self.colorize(title, self.color_scheme.header).bold(),
            self.colorize(&line, self.color_scheme.header)
        ))
    }

    fn format_run(&self, report: &RunReport) -> Result<String> {
        let mut out = String::new();
        writeln!(
            out,
            "{} {}",
            self.colorize("Run", self.color_scheme.header).bold(),
            self.colorize(
                &format!("{} ({})", report.run_id, report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")),
                self.color_scheme.muted
            )
        )
        .ok();

        let levels = Self::levels(&report.run);
        for ((label, step, value), level) in metric_rows(&report.run).into_iter().zip(levels) {
            writeln!(
                out,
                "  {:<12} {}   {}",
                label,
                self.value_cell(&value, 16, level),
                self.status_cell(report, step)
            )
            .ok();
        }

        if self.options.verbose_mode {
            if let Some(summary) = &report.latency_summary {
                let line = format!(
                    "  latency spread: min {:.2} ms, max {:.2} ms, std dev {:.2} ms over {} probes",
                    summary.min_ms, summary.max_ms, summary.std_dev_ms, summary.count
                );
                writeln!(out, "{}", self.colorize(&line, self.color_scheme.info)).ok();
            }
            if let Some(session) = &report.session {
                let line = format!(
                    "  exchange: {} sent, {} echoed, {} duplicates, ended by {:?}",
                    session.sent,
                    session.samples_ms.len(),
                    session.duplicates,
                    session.reason
                );
                writeln!(out, "{}", self.colorize(&line, self.color_scheme.info)).ok();
            }
        }

        match (&report.share_link, &report.persist_error) {
            (Some(link), _) => writeln!(
                out,
                "  {} {}",
                self.colorize("Share:", self.color_scheme.info),
                self.colorize(link, self.color_scheme.highlight).underline()
            )
            .ok(),
            (None, Some(error)) => writeln!(
                out,
                "  {}",
                self.colorize(&format!("Not saved: {}", error), self.color_scheme.warning)
            )
            .ok(),
            (None, None) => None,
        };

        Ok(out.trim_end().to_string())
    }

    fn format_history(&self, history: &[RunReport]) -> Result<String> {
        let mut out = String::new();
        let head = format!(
            "{:<3} {:<20} {:>12} {:>14} {:>14} {:>12} {:>12}",
            "#", "Finished", "Latency", "Download", "Upload", "Jitter", "Loss"
        );
        writeln!(out, "{}", self.colorize(&head, self.color_scheme.header).bold()).ok();

        for (i, report) in history.iter().enumerate() {
            let run = &report.run;
            let levels = Self::levels(run);
            writeln!(
                out,
                "{:<3} {:<20} {} {} {} {} {}",
                i + 1,
                report.finished_at.format("%Y-%m-%d %H:%M:%S"),
                self.value_cell(&format_ms(run.latency), 12, levels[0]),
                self.value_cell(&format_rate(run.download), 14, levels[1]),
                self.value_cell(&format_rate(run.upload), 14, levels[2]),
                self.value_cell(&format_ms(run.jitter), 12, levels[3]),
                self.value_cell(&format_loss(run.packet_loss), 12, levels[4])
            )
            .ok();
        }

        Ok(out.trim_end().to_string())
    }

    fn format_record(&self, record: &ResultRecord) -> Result<String> {
        if !self.options.enable_color {
            return self.plain_formatter.format_record(record);
        }

        let mut out = String::new();
        writeln!(
            out,
            "{} {} {}",
            self.colorize("Result", self.color_scheme.header).bold(),
            self.colorize(&record.id, self.color_scheme.highlight),
            self.colorize(&format!("({})", record.timestamp.to_rfc3339()), self.color_scheme.muted)
        )
        .ok();

        let levels = Self::levels(&record.run);
        for ((label, _, value), level) in metric_rows(&record.run).into_iter().zip(levels) {
            writeln!(out, "  {:<12} {}", label, self.value_cell(&value, 16, level)).ok();
        }
        Ok(out.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✗", self.color_scheme.error).bold(), self.colorize(error, self.color_scheme.error)))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("!", self.color_scheme.warning).bold(), self.colorize(warning, self.color_scheme.warning)))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("{} {}", self.colorize("✓", self.color_scheme.success).bold(), self.colorize(message, self.color_scheme.success)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> ResultRecord {
        ResultRecord {
            id: "f3b1".to_string(),
            run: MeasurementRun {
                latency: Some(20.0),
                download: Some(150.0),
                upload: Some(5.0),
                jitter: None,
                packet_loss: Some(0.0),
            },
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_color_scheme_levels() {
        let scheme = ColorScheme::default();
        assert_eq!(scheme.level(PerformanceLevel::Good), Color::Green);
        assert_eq!(scheme.level(PerformanceLevel::Poor), Color::Red);
    }

    #[test]
    fn test_record_keeps_values() {
        colored::control::set_override(true);
        let formatter = ColoredFormatter::new(FormattingOptions::default());
        let out = formatter.format_record(&record()).unwrap();

        assert!(out.contains("150.00 Mbps"));
        assert!(out.contains("not measured"));
        assert!(out.contains("0.0%"));
    }

    #[test]
    fn test_disabled_color_falls_back_to_plain() {
        let formatter = ColoredFormatter::new(FormattingOptions { enable_color: false, verbose_mode: false });
        let out = formatter.format_record(&record()).unwrap();
        assert!(!out.contains('\u{1b}'));
        assert!(out.starts_with("Result f3b1"));
    }
}
