//! Per-source and global scrape counters.
//!
//! One lock guards the whole state. Every critical section is a bounded map
//! update or copy and no guard is held across an `.await`.

use super::health::{HealthStatus, OverallStatus, SourceHealth};
use crate::core::error::ScrapeError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct SourceMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub in_flight_since: Option<DateTime<Utc>>,
    pub last_duration: Option<Duration>,
    pub last_record_count: usize,
    started: Option<Instant>,
}

impl SourceMetrics {
    fn finish(&mut self) {
        self.last_duration = self.started.take().map(|s| s.elapsed());
        self.in_flight_since = None;
    }

    fn to_health(&self, source_id: &str) -> SourceHealth {
        SourceHealth {
            source_id: source_id.to_string(),
            success_count: self.success_count,
            failure_count: self.failure_count,
            consecutive_failures: self.consecutive_failures,
            last_success: self.last_success,
            last_failure: self.last_failure,
            last_error: self.last_error.clone(),
            in_flight_since: self.in_flight_since,
            last_duration_ms: self.last_duration.map(|d| d.as_millis() as u64),
            last_record_count: self.last_record_count,
        }
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    sources: HashMap<String, SourceMetrics>,
    runs_started: u64,
    runs_finished: u64,
    run_records: usize,
    run_succeeded: HashSet<String>,
    last_run_records: usize,
    last_run_succeeded: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: Mutex<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_run(&self) {
        let mut state = self.state.lock();
        state.runs_started += 1;
        state.run_records = 0;
        state.run_succeeded.clear();
    }

    pub fn start_scrape(&self, source_id: &str) {
        let mut state = self.state.lock();
        let entry = state.sources.entry(source_id.to_string()).or_default();
        entry.in_flight_since = Some(Utc::now());
        entry.started = Some(Instant::now());
    }

    pub fn record_success(&self, source_id: &str, record_count: usize) {
        let mut state = self.state.lock();
        let entry = state.sources.entry(source_id.to_string()).or_default();
        entry.success_count += 1;
        entry.consecutive_failures = 0;
        entry.last_success = Some(Utc::now());
        entry.last_error = None;
        entry.last_record_count = record_count;
        entry.finish();
        state.run_records += record_count;
        state.run_succeeded.insert(source_id.to_string());
        debug!(source = %source_id, record_count, "Recorded success");
    }

    /// Stores the error message only.
    pub fn record_failure(&self, source_id: &str, err: &ScrapeError) {
        let mut state = self.state.lock();
        let entry = state.sources.entry(source_id.to_string()).or_default();
        entry.failure_count += 1;
        entry.consecutive_failures += 1;
        entry.last_failure = Some(Utc::now());
        entry.last_error = Some(err.to_string());
        entry.last_record_count = 0;
        entry.finish();
        state.run_succeeded.remove(source_id);
        debug!(source = %source_id, error = %err, "Recorded failure");
    }

    /// Drops the in-flight marker of a scrape that was cancelled. Nothing is
    /// counted against the source.
    pub fn abandon_scrape(&self, source_id: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.sources.get_mut(source_id) {
            entry.in_flight_since = None;
            entry.started = None;
        }
        debug!(source = %source_id, "Abandoned scrape");
    }

    /// Closes the current run and clears any in-flight markers it left.
    ///
    /// A completed run publishes its totals as the most recent run. An aborted
    /// run is still counted as finished, but the previously published totals
    /// stay in place.
    pub fn finish_run(&self, aborted: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.runs_finished += 1;
        let run_records = std::mem::take(&mut state.run_records);
        if !aborted {
            state.last_run_records = run_records;
            state.last_run_succeeded = Some(state.run_succeeded.len());
        }
        state.run_succeeded.clear();
        for entry in state.sources.values_mut() {
            if entry.in_flight_since.is_some() {
                entry.in_flight_since = None;
                entry.started = None;
            }
        }
    }

    pub fn source(&self, source_id: &str) -> Option<SourceMetrics> {
        self.state.lock().sources.get(source_id).cloned()
    }

    /// Snapshot with one entry per id in `source_ids`, in that order. Sources
    /// that were never scraped show up with zeroed counters.
    pub fn health_status(
        &self,
        next_run: Option<DateTime<Utc>>,
        source_ids: &[&str],
    ) -> HealthStatus {
        let state = self.state.lock();

        let sources: Vec<SourceHealth> = source_ids
            .iter()
            .map(|id| match state.sources.get(*id) {
                Some(metrics) => metrics.to_health(id),
                None => SourceMetrics::default().to_health(id),
            })
            .collect();
        let healthy_sources = sources.iter().filter(|s| s.success_count > 0).count();
        let max_consecutive = sources
            .iter()
            .map(|s| s.consecutive_failures)
            .max()
            .unwrap_or(0);

        HealthStatus {
            status: OverallStatus::classify(
                source_ids.len(),
                healthy_sources,
                state.last_run_succeeded,
                max_consecutive,
            ),
            total_sources: source_ids.len(),
            healthy_sources,
            last_run_succeeded: state.last_run_succeeded,
            last_run_records: state.last_run_records,
            runs_started: state.runs_started,
            runs_finished: state.runs_finished,
            next_run,
            checked_at: Utc::now(),
            sources,
        }
    }
}
