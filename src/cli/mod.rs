//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Network Speed Tester - latency, throughput, jitter and packet loss between a server and a client
#[derive(Parser, Debug, Clone)]
#[command(name = "nst")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Request timeout in seconds
    #[arg(short, long, global = true, value_parser = parse_duration)]
    pub timeout: Option<u64>,

    /// Force colored output
    #[arg(long, global = true)]
    pub color: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,

    /// Log output format (console, json, compact)
    #[arg(long, global = true, value_name = "FORMAT")]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the test server
    Serve(ServeArgs),
    /// Measure against a server and print the results
    Run(RunArgs),
    /// Print a saved result
    Show(ShowArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Interface to bind
    #[arg(long)]
    pub host: Option<String>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory with UI assets
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Persist results as JSON files in this directory instead of memory
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Largest download served, in MB
    #[arg(long, value_name = "MB")]
    pub max_download_mb: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Base URL of the test server
    #[arg(short, long, value_name = "URL")]
    pub server: Option<String>,

    /// Requested download size in MB
    #[arg(long, value_name = "MB")]
    pub download_mb: Option<u64>,

    /// Upload size in MB (capped to 100)
    #[arg(long, value_name = "MB")]
    pub upload_mb: Option<u64>,

    /// Probe packets for the jitter/loss exchange
    #[arg(long, value_name = "N")]
    pub packets: Option<u32>,

    /// Milliseconds between probe packets
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Number of sequential runs
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=100))]
    pub repeat: u32,

    /// Do not submit results to the server
    #[arg(long)]
    pub no_save: bool,

    /// Print runs and history as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Result id returned when the run was saved
    pub id: String,

    /// Base URL of the test server
    #[arg(short, long, value_name = "URL")]
    pub server: Option<String>,

    /// Print the record as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        if let Command::Show(args) = &self.command {
            if args.id.trim().is_empty() {
                return Err("Result id cannot be empty".to_string());
            }
        }

        Ok(())
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Server URL override of the client subcommands
    pub fn server_url(&self) -> Option<&str> {
        match &self.command {
            Command::Run(args) => args.server.as_deref(),
            Command::Show(args) => args.server.as_deref(),
            Command::Serve(_) => None,
        }
    }

    /// JSON output requested
    pub fn json_output(&self) -> bool {
        match &self.command {
            Command::Run(args) => args.json,
            Command::Show(args) => args.json,
            Command::Serve(_) => false,
        }
    }
}

/// Parse duration from seconds string
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 600 {
                Err("Duration cannot exceed 600 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_options() {
        let cli = Cli::parse_from([
            "nst",
            "run",
            "--server", "http://10.0.0.2:8080",
            "--download-mb", "25",
            "--upload-mb", "5",
            "--packets", "50",
            "--interval-ms", "20",
            "--repeat", "3",
            "--no-save",
            "--json",
        ]);

        let Command::Run(args) = &cli.command else {
            panic!("expected run subcommand");
        };
        assert_eq!(args.server.as_deref(), Some("http://10.0.0.2:8080"));
        assert_eq!(args.download_mb, Some(25));
        assert_eq!(args.upload_mb, Some(5));
        assert_eq!(args.packets, Some(50));
        assert_eq!(args.interval_ms, Some(20));
        assert_eq!(args.repeat, 3);
        assert!(args.no_save);
        assert!(cli.json_output());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["nst", "serve", "--port", "9000", "--verbose", "--no-color", "--log-format", "json"]);

        assert!(cli.verbose);
        assert!(cli.no_color);
        assert!(!cli.use_colors());
        assert_eq!(cli.log_format.as_deref(), Some("json"));
        let Command::Serve(args) = &cli.command else {
            panic!("expected serve subcommand");
        };
        assert_eq!(args.port, Some(9000));
    }

    #[test]
    fn test_show_requires_id() {
        assert!(Cli::try_parse_from(["nst", "show"]).is_err());

        let cli = Cli::parse_from(["nst", "show", "4f7c", "--server", "http://localhost:8080"]);
        assert_eq!(cli.server_url(), Some("http://localhost:8080"));
    }

    #[test]
    fn test_repeat_bounds() {
        assert!(Cli::try_parse_from(["nst", "run", "--repeat", "0"]).is_err());
        assert!(Cli::try_parse_from(["nst", "run", "--repeat", "101"]).is_err());
    }

    #[test]
    fn test_conflicting_color_flags() {
        let cli = Cli::parse_from(["nst", "run", "--color", "--no-color"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("10").unwrap(), 10);
        assert_eq!(parse_duration("600").unwrap(), 600);

        assert!(parse_duration("0").is_err());
        assert!(parse_duration("601").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("+10").is_err());
        assert!(parse_duration("0x10").is_err());
        assert!(parse_duration("-5").is_err());
    }

    #[test]
    fn test_color_support_detection() {
        std::env::set_var("NO_COLOR", "1");
        assert!(!supports_color());
        std::env::remove_var("NO_COLOR");
    }
}
