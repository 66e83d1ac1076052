//! Core abstractions shared by the scraper and the CLI

pub mod config;
pub mod error;
pub mod log;
pub mod rate;

// Re-export main types for cleaner imports
pub use error::{RunCancelled, ScrapeError};
pub use rate::{RateRecord, RateSource};
