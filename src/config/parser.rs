//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::{Cli, Command},
    config::env::EnvManager,
    error::Result,
    models::Config,
};
use tracing::{debug, warn};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        EnvManager::load_env_file()?;
        for problem in EnvManager::validate_current_env() {
            warn!("{}", problem);
        }
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    pub fn apply_cli_overrides(&self, config: &mut Config) {
        let cli = &self.cli;

        if let Some(timeout) = cli.timeout {
            config.timeout_seconds = timeout;
        }

        if cli.no_color {
            config.enable_color = false;
        } else if cli.color {
            config.enable_color = true;
        }

        if let Some(format) = &cli.log_format {
            config.log_format = format.trim().to_lowercase();
        }

        // CLI-only flags
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        match &cli.command {
            Command::Serve(args) => {
                if let Some(host) = &args.host {
                    config.server_host = host.clone();
                }
                if let Some(port) = args.port {
                    config.server_port = port;
                }
                if let Some(dir) = &args.static_dir {
                    config.static_dir = dir.clone();
                }
                if let Some(dir) = &args.data_dir {
                    config.data_dir = Some(dir.clone());
                }
                if let Some(max) = args.max_download_mb {
                    config.max_download_mb = max;
                }
            }
            Command::Run(args) => {
                if let Some(server) = &args.server {
                    config.server_url = server.clone();
                }
                if let Some(size) = args.download_mb {
                    config.download_size_mb = size;
                }
                if let Some(size) = args.upload_mb {
                    config.upload_size_mb = size;
                }
                if let Some(count) = args.packets {
                    config.packet_count = count;
                }
                if let Some(interval) = args.interval_ms {
                    config.packet_interval_ms = interval;
                }
                if args.no_save {
                    config.save_results = false;
                }
            }
            Command::Show(args) => {
                if let Some(server) = &args.server {
                    config.server_url = server.clone();
                }
            }
        }

        debug!(
            timeout_secs = config.timeout_seconds,
            enable_color = config.enable_color,
            server_url = %config.server_url,
            "Applied CLI overrides"
        );
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Listen: {}:{}", config.server_host, config.server_port));
    summary.push(format!(
        "Downloads: default {} MB, max {} MB, {} B chunks",
        config.default_download_mb,
        config.download_cap_mb(),
        config.chunk_size
    ));
    summary.push(format!(
        "Result store: {}",
        config
            .data_dir
            .as_ref()
            .map_or_else(|| "memory".to_string(), |dir| dir.display().to_string())
    ));
    summary.push(format!("Server URL: {}", config.server_url));
    summary.push(format!(
        "Transfers: {} MB down, {} MB up",
        config.download_size_mb, config.upload_size_mb
    ));
    summary.push(format!(
        "Exchange: {} packets every {} ms, {} ms grace",
        config.packet_count, config.packet_interval_ms, config.drain_grace_ms
    ));
    summary.push(format!("Timeout: {}s", config.timeout_seconds));
    summary.push(format!("Save results: {}", config.save_results));
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}
