use super::report;
use crate::scraper::Orchestrator;
use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Scrapes every `interval` until the token is cancelled.
pub async fn run(
    orchestrator: &Orchestrator,
    token: &CancellationToken,
    interval: Duration,
) -> Result<()> {
    info!(
        sources = orchestrator.bank_count(),
        interval_secs = interval.as_secs(),
        "Watching rates"
    );

    loop {
        match orchestrator.scrape_all(token).await {
            Ok(results) => println!("{}", report::results_table(&results)),
            Err(cancelled) => {
                warn!("{cancelled}");
                println!("{}", report::results_table(&cancelled.partial));
                break;
            }
        }

        let next_run = Utc::now() + chrono::Duration::from_std(interval)?;
        let health = orchestrator.health_status(Some(next_run));
        info!(
            status = %health.status,
            healthy = health.healthy_sources,
            total = health.total_sources,
            records = health.last_run_records,
            next_run = %next_run,
            "Run complete"
        );
        println!("\n{}\n", report::health_summary(&health));

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("Stopped watching");
    Ok(())
}
