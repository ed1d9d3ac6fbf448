// Tabula admin entrypoint
//!
//! Loads configuration, installs logging, bootstraps the core and runs one
//! subcommand. Command output is JSON on stdout; logs go to the log file and
//! stderr.

use anyhow::Result;
use clap::Parser;
use log::info;
use tabula_server::args::Cli;
use tabula_server::{commands, lifecycle, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match lifecycle::load_config(&cli.config, cli.data_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("❌ FATAL: Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    let log_path = format!("{}/tabula.log", config.logging.logs_path);
    logging::init_logging(
        &config.logging.level,
        &log_path,
        config.logging.log_to_console,
        Some(&config.logging.targets),
        &config.logging.format,
    )?;
    info!(
        "Tabula v{} (data: {})",
        env!("CARGO_PKG_VERSION"),
        config.storage.data_path
    );

    let components = lifecycle::bootstrap(&config).await?;
    let result = commands::dispatch(&components.app_context, &cli.command, &cli.actor).await;
    components.shutdown().await;

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            log::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(2);
        }
    }
}
