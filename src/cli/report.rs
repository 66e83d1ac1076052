use super::ui;
use crate::core::RateRecord;
use crate::scraper::{HealthStatus, Orchestrator, ScrapeResult};
use anyhow::Result;
use comfy_table::{Cell, CellAlignment};
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub fn results_table(results: &[ScrapeResult]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Bank"),
        ui::header_cell("Status"),
        ui::header_cell("Records"),
        ui::header_cell("Attempts"),
        ui::header_cell("Time (ms)"),
        ui::header_cell("Error"),
    ]);

    for result in results {
        let error = result
            .error
            .as_ref()
            .map(|e| ui::style_text(&e.to_string(), ui::StyleType::Error))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(format!("{} ({})", result.source_name, result.source_id)),
            ui::outcome_cell(result.success),
            Cell::new(result.record_count).set_alignment(CellAlignment::Right),
            Cell::new(result.attempts).set_alignment(CellAlignment::Right),
            Cell::new(result.duration.as_millis()).set_alignment(CellAlignment::Right),
            Cell::new(error),
        ]);
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    let total_records: usize = results.iter().map(|r| r.record_count).sum();
    format!(
        "{}\n\n{} {}/{} sources, {} records",
        table,
        ui::style_text("Succeeded:", ui::StyleType::TotalLabel),
        succeeded,
        results.len(),
        ui::style_text(&total_records.to_string(), ui::StyleType::TotalValue),
    )
}

pub fn rates_table(records: &[RateRecord]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Bank"),
        ui::header_cell("Product"),
        ui::header_cell("Term (months)"),
        ui::header_cell("Rate"),
    ]);

    for record in records {
        table.add_row(vec![
            Cell::new(&record.source_id),
            Cell::new(&record.product),
            ui::format_optional_cell(record.term_months, |t| t.to_string()),
            ui::rate_cell(record.rate),
        ]);
    }

    table.to_string()
}

pub fn health_summary(health: &HealthStatus) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Bank"),
        ui::header_cell("Successes"),
        ui::header_cell("Failures"),
        ui::header_cell("Streak"),
        ui::header_cell("Last success"),
        ui::header_cell("Last error"),
    ]);

    for source in &health.sources {
        table.add_row(vec![
            Cell::new(&source.source_id),
            Cell::new(source.success_count).set_alignment(CellAlignment::Right),
            Cell::new(source.failure_count).set_alignment(CellAlignment::Right),
            Cell::new(source.consecutive_failures).set_alignment(CellAlignment::Right),
            ui::format_optional_cell(source.last_success, |t| {
                t.format("%Y-%m-%d %H:%M:%S").to_string()
            }),
            Cell::new(source.last_error.as_deref().unwrap_or("")),
        ]);
    }

    let next_run = health
        .next_run
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "not scheduled".to_string());
    format!(
        "{} {}\n{}\n\n{}",
        ui::style_text("Status:", ui::StyleType::Title),
        ui::status_text(health.status),
        ui::style_text(
            &format!(
                "{}/{} sources healthy, {} records in last run, next run: {}",
                health.healthy_sources, health.total_sources, health.last_run_records, next_run
            ),
            ui::StyleType::Subtle
        ),
        table
    )
}

pub async fn run_scrape(orchestrator: &Orchestrator, token: &CancellationToken) -> Result<()> {
    match orchestrator.scrape_all(token).await {
        Ok(results) => println!("{}", results_table(&results)),
        Err(cancelled) => {
            warn!("{cancelled}");
            println!("{}", results_table(&cancelled.partial));
        }
    }
    Ok(())
}

pub async fn run_bank(
    orchestrator: &Orchestrator,
    token: &CancellationToken,
    source_id: &str,
) -> Result<()> {
    let result = orchestrator.scrape_bank(token, source_id).await?;
    println!("{}", results_table(std::slice::from_ref(&result)));
    if result.success {
        println!("\n{}", rates_table(&result.records));
    }
    Ok(())
}

pub async fn run_rates(orchestrator: &Orchestrator, token: &CancellationToken) -> Result<()> {
    let records = orchestrator.get_all_rates(token).await?;
    println!("{}", rates_table(&records));
    Ok(())
}

/// Runs one scrape and prints the resulting health snapshot as JSON.
pub async fn run_health(orchestrator: &Orchestrator, token: &CancellationToken) -> Result<()> {
    if let Err(cancelled) = orchestrator.scrape_all(token).await {
        warn!("{cancelled}");
    }
    let health = orchestrator.health_status(None);
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
