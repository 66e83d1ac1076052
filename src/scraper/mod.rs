//! Sequential rate scraping with retries and health tracking

pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod retry;

pub use health::{HealthStatus, OverallStatus, SourceHealth};
pub use metrics::MetricsCollector;
pub use orchestrator::{Orchestrator, ScrapeResult};
pub use retry::RetryPolicy;
