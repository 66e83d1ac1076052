//! Derived health view over the scrape metrics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;

/// A source with this many failures in a row marks the whole system degraded.
pub const DEGRADED_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OverallStatus::Healthy => "healthy",
                OverallStatus::Degraded => "degraded",
                OverallStatus::Unhealthy => "unhealthy",
            }
        )
    }
}

impl OverallStatus {
    /// - unhealthy: no source has ever succeeded
    /// - degraded: the last finished run missed at least one configured source,
    ///   or some source is at [`DEGRADED_CONSECUTIVE_FAILURES`] or more
    /// - healthy: otherwise
    pub fn classify(
        total_sources: usize,
        ever_succeeded: usize,
        last_run_succeeded: Option<usize>,
        max_consecutive_failures: u32,
    ) -> Self {
        if ever_succeeded == 0 {
            return OverallStatus::Unhealthy;
        }
        let incomplete_run = last_run_succeeded.is_some_and(|n| n < total_sources);
        if incomplete_run || max_consecutive_failures >= DEGRADED_CONSECUTIVE_FAILURES {
            return OverallStatus::Degraded;
        }
        OverallStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceHealth {
    pub source_id: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub in_flight_since: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_record_count: usize,
}

/// Point-in-time snapshot, computed on demand.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: OverallStatus,
    pub total_sources: usize,
    /// Sources with at least one recorded success.
    pub healthy_sources: usize,
    /// Sources that succeeded in the most recent run that was not cancelled.
    pub last_run_succeeded: Option<usize>,
    pub last_run_records: usize,
    pub runs_started: u64,
    pub runs_finished: u64,
    pub next_run: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
    pub sources: Vec<SourceHealth>,
}

impl HealthStatus {
    pub fn source(&self, source_id: &str) -> Option<&SourceHealth> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }
}
