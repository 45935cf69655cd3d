//! Network Speed Tester - Main CLI Application
//!
//! `nst serve` runs the test server, `nst run` measures against one and
//! `nst show` prints a saved result.

use clap::Parser;
use network_speed_tester::{app::App, cli::Cli, config::EnvManager, error::AppError, logging};
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    if let Err(e) = run_application(cli).await {
        eprintln!("{}", e.format_for_console(use_color));
        if e.is_recoverable() || matches!(e, AppError::Config(_) | AppError::NotFound(_)) {
            eprintln!();
            eprintln!("{}", e.user_friendly_message());
        }
        process::exit(e.exit_code());
    }
}

async fn run_application(cli: Cli) -> network_speed_tester::Result<()> {
    // LOG_FORMAT may live in .env; loading it again later is a no-op
    EnvManager::load_env_file()?;
    logging::init_from_cli(&cli)?;

    let app = App::new(cli)?;
    app.run().await
}
