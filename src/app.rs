//! Main application orchestration and execution

use crate::{
    cli::{Cli, Command},
    client::{HttpClient, NetworkClient},
    config::{display_config_summary, load_config},
    error::{AppError, Result},
    executor::{RunReport, SessionContext, TestRunner},
    models::Config,
    output::{self, OutputFormatter, OutputFormatterFactory},
    server::SpeedTestServer,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
    config: Config,
}

impl App {
    /// Validate the arguments and load the layered configuration
    pub fn new(cli: Cli) -> Result<Self> {
        cli.validate().map_err(AppError::config)?;
        let mut config = load_config(cli.clone())?;
        config.enable_color = config.enable_color && cli.use_colors();
        Ok(Self { cli, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn formatter(&self) -> Box<dyn OutputFormatter> {
        OutputFormatterFactory::create_formatter(self.config.enable_color, self.config.verbose)
    }

    /// Run the selected subcommand
    pub async fn run(self) -> Result<()> {
        debug!(build = %crate::build_info(), "Starting");
        if self.config.debug {
            debug!("Configuration:\n{}", display_config_summary(&self.config));
        }

        match &self.cli.command {
            Command::Serve(_) => self.serve().await,
            Command::Run(args) => self.measure(args.repeat, args.json).await,
            Command::Show(args) => self.show(&args.id, args.json).await,
        }
    }

    async fn serve(&self) -> Result<()> {
        info!(version = crate::VERSION, "Starting network speed test server");
        let server = SpeedTestServer::new(self.config.clone()).await?;
        server.run().await
    }

    async fn measure(&self, repeat: u32, json: bool) -> Result<()> {
        let client: Arc<dyn HttpClient> = Arc::new(NetworkClient::from_config(&self.config)?);
        let context = Arc::new(SessionContext::new());
        let runner = TestRunner::new(Arc::new(self.config.clone()), client, context.clone());

        let formatter = self.formatter();
        if !json {
            println!("{}", formatter.format_header(&format!("Speed test against {}", self.config.server_url))?);
        }

        let mut reports = Vec::with_capacity(repeat as usize);
        for _ in 0..repeat.max(1) {
            let report = runner.run_once().await?;
            if !json {
                println!("\n{}", formatter.format_run(&report)?);
            }
            reports.push(report);
        }

        let history = context.history();
        if json {
            println!("{}", output::to_json(&reports, &history)?);
        } else {
            println!("\n{}", formatter.format_header("History")?);
            println!("{}", formatter.format_history(&history)?);
        }

        last_run_status(&reports)
    }

    async fn show(&self, id: &str, json: bool) -> Result<()> {
        let client = NetworkClient::from_config(&self.config)?;
        let record = client.load_result(id.trim()).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&record)?);
        } else {
            println!("{}", self.formatter().format_record(&record)?);
        }
        Ok(())
    }
}

/// Success when the last run measured at least one quantity
pub fn last_run_status(reports: &[RunReport]) -> Result<()> {
    match reports.last() {
        Some(report) if report.run.has_any_measurement() => Ok(()),
        Some(report) => {
            let detail = report
                .steps
                .iter()
                .filter_map(|s| s.detail.as_deref().map(|d| format!("{}: {}", s.step, d)))
                .collect::<Vec<_>>()
                .join("; ");
            Err(AppError::test_execution(format!("nothing could be measured ({})", detail)))
        }
        None => Err(AppError::test_execution("no run was executed")),
    }
}
