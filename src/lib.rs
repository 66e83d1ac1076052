pub mod cli;
pub mod core;
pub mod providers;
pub mod scraper;

use crate::core::config::AppConfig;
use crate::scraper::Orchestrator;
use anyhow::Result;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Scrape,
    Bank(String),
    Rates,
    Health,
    Watch,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Rate watcher starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let orchestrator = Orchestrator::from_config(&config)?;
    let token = cli::shutdown_token();

    match command {
        AppCommand::Scrape => cli::report::run_scrape(&orchestrator, &token).await,
        AppCommand::Bank(source_id) => {
            cli::report::run_bank(&orchestrator, &token, &source_id).await
        }
        AppCommand::Rates => cli::report::run_rates(&orchestrator, &token).await,
        AppCommand::Health => cli::report::run_health(&orchestrator, &token).await,
        AppCommand::Watch => {
            let interval = Duration::from_secs(config.schedule.interval_secs.max(1));
            cli::watch::run(&orchestrator, &token, interval).await
        }
    }
}
