//! Rate records and the source abstraction

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub source_id: String,
    pub product: String,
    pub term_months: Option<u32>,
    /// Annual rate in percent.
    pub rate: f64,
    pub fetched_at: DateTime<Utc>,
}

/// A provider of interest-rate data, usually one bank.
///
/// The orchestrator only relies on this contract; transport and parsing are
/// up to the implementation.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Stable machine-readable key, unique across configured sources.
    fn identifier(&self) -> &str;

    /// Human readable label for logs and reports.
    fn display_name(&self) -> &str;

    async fn fetch_rates(&self) -> Result<Vec<RateRecord>>;
}
