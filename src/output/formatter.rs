//! Core formatting trait and the plain text implementation

use crate::{
    error::Result,
    executor::RunReport,
    models::{MeasurementRun, ResultRecord},
    types::{StepStatus, SubTest},
};
use std::fmt::Write as _;

pub const NOT_MEASURED: &str = "not measured";

/// Main trait for output formatting
pub trait OutputFormatter {
    /// Format a header section
    fn format_header(&self, title: &str) -> Result<String>;

    /// Format one finished run with its step status lines
    fn format_run(&self, report: &RunReport) -> Result<String>;

    /// Format the local history table, most recent first
    fn format_history(&self, history: &[RunReport]) -> Result<String>;

    /// Format a record fetched from the server
    fn format_record(&self, record: &ResultRecord) -> Result<String>;

    /// Format error messages
    fn format_error(&self, error: &str) -> Result<String>;

    /// Format warning messages
    fn format_warning(&self, warning: &str) -> Result<String>;

    /// Format success messages
    fn format_success(&self, message: &str) -> Result<String>;
}

/// Configuration options for formatting
#[derive(Debug, Clone)]
pub struct FormattingOptions {
    /// Enable colored output
    pub enable_color: bool,
    /// Show latency spread and session counters
    pub verbose_mode: bool,
}

impl Default for FormattingOptions {
    fn default() -> Self {
        Self {
            enable_color: true,
            verbose_mode: false,
        }
    }
}

/// Latency or jitter, two decimals
pub fn format_ms(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_MEASURED.to_string(), |v| format!("{:.2} ms", v))
}

/// Throughput, two decimals
pub fn format_rate(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_MEASURED.to_string(), |v| format!("{:.2} Mbps", v))
}

/// Packet loss, one decimal
pub fn format_loss(value: Option<f64>) -> String {
    value.map_or_else(|| NOT_MEASURED.to_string(), |v| format!("{:.1}%", v))
}

/// The five displayed quantities with the step that produced each
pub fn metric_rows(run: &MeasurementRun) -> [(&'static str, SubTest, String); 5] {
    [
        ("Latency", SubTest::Latency, format_ms(run.latency)),
        ("Download", SubTest::Download, format_rate(run.download)),
        ("Upload", SubTest::Upload, format_rate(run.upload)),
        ("Jitter", SubTest::Exchange, format_ms(run.jitter)),
        ("Packet loss", SubTest::Exchange, format_loss(run.packet_loss)),
    ]
}

/// Status text of a step, with the failure detail
pub fn status_text(status: Option<&StepStatus>) -> String {
    match status {
        Some(step) if step.status.is_success() => step.status.label().to_string(),
        Some(step) => match &step.detail {
            Some(detail) => format!("{}: {}", step.status.label(), detail),
            None => step.status.label().to_string(),
        },
        None => "skipped".to_string(),
    }
}

/// Plain text formatter for pipes, logs and `--no-color`
pub struct PlainFormatter {
    options: FormattingOptions,
}

impl PlainFormatter {
    pub fn new(options: FormattingOptions) -> Self {
        Self { options }
    }

    fn write_details(&self, out: &mut String, report: &RunReport) -> std::fmt::Result {
        if let Some(summary) = &report.latency_summary {
            writeln!(
                out,
                "  latency spread: min {:.2} ms, max {:.2} ms, std dev {:.2} ms over {} probes",
                summary.min_ms, summary.max_ms, summary.std_dev_ms, summary.count
            )?;
        }
        if let Some(session) = &report.session {
            writeln!(
                out,
                "  exchange: {} sent, {} echoed, {} duplicates, ended by {:?}",
                session.sent,
                session.samples_ms.len(),
                session.duplicates,
                session.reason
            )?;
        }
        Ok(())
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_header(&self, title: &str) -> Result<String> {
        Ok(format!("{}\n{}", title, "=".repeat(title.len())))
    }

    fn format_run(&self, report: &RunReport) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "Run {} ({})", report.run_id, report.finished_at.format("%Y-%m-%d %H:%M:%S UTC")).ok();

        for (label, step, value) in metric_rows(&report.run) {
            writeln!(out, "  {:<12} {:>16}   {}", label, value, status_text(report.step(step))).ok();
        }

        if self.options.verbose_mode {
            self.write_details(&mut out, report).ok();
        }

        match (&report.share_link, &report.persist_error) {
            (Some(link), _) => writeln!(out, "  Share: {}", link).ok(),
            (None, Some(error)) => writeln!(out, "  Not saved: {}", error).ok(),
            (None, None) => None,
        };

        Ok(out.trim_end().to_string())
    }

    fn format_history(&self, history: &[RunReport]) -> Result<String> {
        let mut out = String::new();
        writeln!(
            out,
            "{:<3} {:<20} {:>12} {:>14} {:>14} {:>12} {:>12}",
            "#", "Finished", "Latency", "Download", "Upload", "Jitter", "Loss"
        )
        .ok();

        for (i, report) in history.iter().enumerate() {
            let run = &report.run;
            writeln!(
                out,
                "{:<3} {:<20} {:>12} {:>14} {:>14} {:>12} {:>12}",
                i + 1,
                report.finished_at.format("%Y-%m-%d %H:%M:%S"),
                format_ms(run.latency),
                format_rate(run.download),
                format_rate(run.upload),
                format_ms(run.jitter),
                format_loss(run.packet_loss)
            )
            .ok();
        }

        Ok(out.trim_end().to_string())
    }

    fn format_record(&self, record: &ResultRecord) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "Result {} ({})", record.id, record.timestamp.to_rfc3339()).ok();
        for (label, _, value) in metric_rows(&record.run) {
            writeln!(out, "  {:<12} {:>16}", label, value).ok();
        }
        Ok(out.trim_end().to_string())
    }

    fn format_error(&self, error: &str) -> Result<String> {
        Ok(format!("ERROR: {}", error))
    }

    fn format_warning(&self, warning: &str) -> Result<String> {
        Ok(format!("WARNING: {}", warning))
    }

    fn format_success(&self, message: &str) -> Result<String> {
        Ok(format!("OK: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepStatus, TestStatus};
    use chrono::Utc;
    use uuid::Uuid;

    fn report() -> RunReport {
        RunReport {
            run_id: Uuid::nil(),
            run: MeasurementRun {
                latency: Some(12.345),
                download: Some(94.1),
                upload: None,
                jitter: Some(1.5),
                packet_loss: Some(2.0),
            },
            steps: vec![
                StepStatus::success(SubTest::Latency),
                StepStatus::success(SubTest::Download),
                StepStatus::with_status(SubTest::Upload, TestStatus::TransportFailed, "connection reset"),
                StepStatus::success(SubTest::Exchange),
            ],
            latency_summary: None,
            session: None,
            saved_id: Some("abc".to_string()),
            share_link: Some("http://localhost:8080/results/abc".to_string()),
            persist_error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_value_formats() {
        assert_eq!(format_ms(Some(12.345)), "12.35 ms");
        assert_eq!(format_rate(Some(94.1)), "94.10 Mbps");
        assert_eq!(format_loss(Some(2.0)), "2.0%");
        assert_eq!(format_ms(None), NOT_MEASURED);
    }

    #[test]
    fn test_run_output() {
        let formatter = PlainFormatter::new(FormattingOptions { enable_color: false, verbose_mode: false });
        let out = formatter.format_run(&report()).unwrap();

        assert!(out.contains("12.35 ms"));
        assert!(out.contains("not measured   transport error: connection reset"));
        assert!(out.contains("Share: http://localhost:8080/results/abc"));
    }

    #[test]
    fn test_history_rows() {
        let formatter = PlainFormatter::new(FormattingOptions::default());
        let out = formatter.format_history(&[report(), report()]).unwrap();
        assert_eq!(out.lines().count(), 3);
    }
}
