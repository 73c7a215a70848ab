//! Stratum - LLM-directed data pipeline agent
//!
#![doc = "Main entry point for the Stratum command-line interface."]

use anyhow::Result;

use stratum::agent::metrics::init_metrics_exporter;
use stratum::cli::{Cli, Commands};
use stratum::commands;
use stratum::config::Config;
use stratum::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();

    let config_path = cli.config.as_deref().unwrap_or("config/stratum.yaml");
    let config = Config::load(config_path, &cli)?;

    init_logging(&config.logging, cli.verbose)?;
    config.validate()?;
    init_metrics_exporter(&config.metrics);

    tracing::debug!("Loaded configuration from {}", config_path);

    match cli.command {
        Commands::Run { goal, max_steps } => {
            commands::run::run_goal(config, goal, max_steps).await?;
        }
        Commands::Tools => {
            commands::tools::list_tools(&config)?;
        }
        Commands::Tables { command } => {
            commands::tables::handle_tables(&config, command)?;
        }
        Commands::History { command } => {
            commands::history::handle_history(&config, command)?;
        }
    }

    Ok(())
}
