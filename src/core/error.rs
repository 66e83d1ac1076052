//! Error types for the scraping pipeline

use crate::scraper::ScrapeResult;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Transport or parse failure reported by a rate source.
    #[error("source error: {0:#}")]
    Source(#[from] anyhow::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The source answered but returned no rate records.
    #[error("no data found for source: {source_id}")]
    NoDataFound { source_id: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("scrape cancelled")]
    Cancelled,
}

impl ScrapeError {
    /// Default retry classification. Empty responses are retried like
    /// transport errors since scraped sites return them intermittently.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::Source(_) | ScrapeError::Timeout(_) | ScrapeError::NoDataFound { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScrapeError::Cancelled)
    }
}

/// Returned by a run that was cancelled before visiting every source.
/// Carries whatever was collected up to that point.
#[derive(Debug, Error)]
#[error("scrape run cancelled after {} of {total} sources", partial.len())]
pub struct RunCancelled {
    pub partial: Vec<ScrapeResult>,
    pub total: usize,
}

impl From<RunCancelled> for ScrapeError {
    fn from(_: RunCancelled) -> Self {
        ScrapeError::Cancelled
    }
}
