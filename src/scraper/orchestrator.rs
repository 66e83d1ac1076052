use super::health::HealthStatus;
use super::metrics::MetricsCollector;
use super::retry::RetryPolicy;
use crate::core::config::{AppConfig, OrchestratorConfig};
use crate::core::error::{RunCancelled, ScrapeError};
use crate::core::rate::{RateRecord, RateSource};
use crate::providers::JsonRateSource;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of scraping one source within a run.
#[derive(Debug)]
pub struct ScrapeResult {
    pub source_id: String,
    pub source_name: String,
    /// Empty when the source failed.
    pub records: Vec<RateRecord>,
    pub success: bool,
    pub error: Option<ScrapeError>,
    pub duration: Duration,
    pub record_count: usize,
    pub attempts: u32,
}

/// Walks the configured sources one at a time, with jittered pauses between
/// them, and keeps health metrics for every source.
pub struct Orchestrator {
    sources: Vec<Box<dyn RateSource>>,
    config: OrchestratorConfig,
    retry: RetryPolicy,
    metrics: MetricsCollector,
    rng: Mutex<StdRng>,
}

impl Orchestrator {
    pub fn new(
        sources: Vec<Box<dyn RateSource>>,
        config: OrchestratorConfig,
        mut rng: StdRng,
    ) -> Self {
        let retry_rng = StdRng::seed_from_u64(rng.r#gen());
        let retry = RetryPolicy::with_rng(config.retry.clone(), retry_rng);
        Orchestrator {
            sources,
            config,
            retry,
            metrics: MetricsCollector::new(),
            rng: Mutex::new(rng),
        }
    }

    /// Builds the configured HTTP sources. They all share one client, and so
    /// one connection pool.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.scraper.request_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let sources = config
            .sources
            .iter()
            .map(|source| {
                Box::new(JsonRateSource::new(
                    &source.id,
                    &source.name,
                    &source.url,
                    client.clone(),
                )) as Box<dyn RateSource>
            })
            .collect();

        Ok(Self::new(
            sources,
            config.scraper.clone(),
            StdRng::from_entropy(),
        ))
    }

    pub fn bank_count(&self) -> usize {
        self.sources.len()
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.identifier())
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn health_status(&self, next_run: Option<DateTime<Utc>>) -> HealthStatus {
        let source_ids: Vec<&str> = self.source_ids().collect();
        self.metrics.health_status(next_run, &source_ids)
    }

    /// Pause between two sources, uniform in `[min_delay, max_delay)`.
    pub fn next_delay(&self) -> Duration {
        let min = self.config.min_delay();
        let max = self.config.max_delay();
        if max <= min {
            return min;
        }
        self.rng.lock().gen_range(min..max)
    }

    /// Scrapes every source in configured order. A failing source never stops
    /// the run; only cancellation does, in which case the results gathered so
    /// far come back inside [`RunCancelled`].
    pub async fn scrape_all(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<ScrapeResult>, RunCancelled> {
        let total = self.sources.len();
        info!(sources = total, "Starting scrape run");
        self.metrics.start_run();

        let mut results = Vec::with_capacity(total);
        for (index, source) in self.sources.iter().enumerate() {
            if token.is_cancelled() {
                return Err(self.abort_run(results));
            }

            match self.scrape_source(source.as_ref(), token).await {
                Ok(result) => results.push(result),
                Err(_) => return Err(self.abort_run(results)),
            }

            if index + 1 < total {
                let delay = self.next_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Waiting before next source");
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(self.abort_run(results)),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        self.metrics.finish_run(false);
        let succeeded = results.iter().filter(|r| r.success).count();
        info!(succeeded, failed = total - succeeded, "Scrape run finished");
        Ok(results)
    }

    /// Scrapes a single source by id, outside of any run.
    pub async fn scrape_bank(
        &self,
        token: &CancellationToken,
        source_id: &str,
    ) -> Result<ScrapeResult, ScrapeError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.identifier() == source_id)
            .ok_or_else(|| ScrapeError::UnknownSource(source_id.to_string()))?;

        if token.is_cancelled() {
            return Err(ScrapeError::Cancelled);
        }
        self.scrape_source(source.as_ref(), token).await
    }

    /// Records of every source that succeeded, in source order.
    pub async fn get_all_rates(
        &self,
        token: &CancellationToken,
    ) -> Result<Vec<RateRecord>, ScrapeError> {
        let results = self.scrape_all(token).await?;
        Ok(results
            .into_iter()
            .filter(|r| r.success)
            .flat_map(|r| r.records)
            .collect())
    }

    fn abort_run(&self, partial: Vec<ScrapeResult>) -> RunCancelled {
        self.metrics.finish_run(true);
        warn!(
            completed = partial.len(),
            total = self.sources.len(),
            "Scrape run cancelled"
        );
        RunCancelled {
            partial,
            total: self.sources.len(),
        }
    }

    /// Only fails on cancellation; source errors end up in the result.
    #[instrument(
        name = "ScrapeSource",
        skip(self, source, token),
        fields(source = %source.identifier())
    )]
    async fn scrape_source(
        &self,
        source: &dyn RateSource,
        token: &CancellationToken,
    ) -> Result<ScrapeResult, ScrapeError> {
        let source_id = source.identifier();
        self.metrics.start_scrape(source_id);
        let started = Instant::now();

        let mut attempts = 0;
        let outcome = self
            .retry
            .execute(token, || {
                attempts += 1;
                self.fetch_once(source)
            })
            .await;
        let duration = started.elapsed();

        let (records, error) = match outcome {
            Ok(records) => {
                self.metrics.record_success(source_id, records.len());
                info!(
                    records = records.len(),
                    attempts,
                    duration_ms = duration.as_millis() as u64,
                    "Source scraped"
                );
                (records, None)
            }
            Err(ScrapeError::Cancelled) => {
                self.metrics.abandon_scrape(source_id);
                return Err(ScrapeError::Cancelled);
            }
            Err(err) => {
                self.metrics.record_failure(source_id, &err);
                warn!(error = %err, attempts, "Source failed");
                (Vec::new(), Some(err))
            }
        };

        Ok(ScrapeResult {
            source_id: source_id.to_string(),
            source_name: source.display_name().to_string(),
            record_count: records.len(),
            success: error.is_none(),
            records,
            error,
            duration,
            attempts,
        })
    }

    async fn fetch_once(&self, source: &dyn RateSource) -> Result<Vec<RateRecord>, ScrapeError> {
        let timeout = self.config.request_timeout();
        let records = tokio::time::timeout(timeout, source.fetch_rates())
            .await
            .map_err(|_| ScrapeError::Timeout(timeout))??;

        if records.is_empty() {
            return Err(ScrapeError::NoDataFound {
                source_id: source.identifier().to_string(),
            });
        }
        Ok(records)
    }
}
