//! Retry with exponential backoff for a single source invocation.

use crate::core::config::RetryConfig;
use crate::core::error::ScrapeError;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Decides whether a failed attempt may be retried.
pub type RetryClassifier = fn(&ScrapeError) -> bool;

#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    is_retryable: RetryClassifier,
    rng: Mutex<StdRng>,
}

impl RetryPolicy {
    pub fn with_rng(config: RetryConfig, rng: StdRng) -> Self {
        RetryPolicy {
            config,
            is_retryable: ScrapeError::is_retryable,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_classifier(mut self, classifier: RetryClassifier) -> Self {
        self.is_retryable = classifier;
        self
    }

    /// Sleep before the retry that follows the failed attempt `attempt` (0-indexed):
    /// `base_delay * multiplier^attempt`, capped by `max_delay`, plus jitter of
    /// `[0, base_delay / 2)` when enabled. Jitter never pushes past the cap.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = base.as_secs_f64() * self.config.backoff_multiplier().powi(exponent);
        let mut delay = Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX);

        let cap = self.config.max_delay();
        if let Some(cap) = cap {
            delay = delay.min(cap);
        }

        if !self.config.jitter {
            return delay;
        }

        let jitter_range = base / 2;
        if jitter_range.is_zero() {
            return delay;
        }
        let jitter = self.rng.lock().gen_range(Duration::ZERO..jitter_range);
        let delay = delay.saturating_add(jitter);
        match cap {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. The last error is returned unchanged.
    ///
    /// Cancellation is observed before each attempt and during backoff sleeps;
    /// an attempt already in flight is left to finish.
    pub async fn execute<F, Fut, T>(
        &self,
        token: &CancellationToken,
        mut operation: F,
    ) -> Result<T, ScrapeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ScrapeError>>,
    {
        let max_attempts = self.config.max_attempts();
        let mut attempt = 0;
        loop {
            if token.is_cancelled() {
                return Err(ScrapeError::Cancelled);
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            attempt += 1;

            if err.is_cancelled() {
                return Err(err);
            }
            if !(self.is_retryable)(&err) {
                debug!(attempt, error = %err, "Non-retryable error");
                return Err(err);
            }
            if attempt >= max_attempts {
                debug!(attempt, error = %err, "Retries exhausted");
                return Err(err);
            }

            let delay = self.delay_for_attempt(attempt - 1);
            warn!(
                attempt,
                max = max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed, retrying"
            );
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ScrapeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use rand::SeedableRng;
    use tokio::time::Instant;

    fn config(max_attempts: u32, base_delay_ms: u64, max_delay_ms: Option<u64>) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms,
            backoff_multiplier: 2.0,
            max_delay_ms,
            jitter: false,
        }
    }

    fn policy(config: RetryConfig) -> RetryPolicy {
        RetryPolicy::with_rng(config, StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_backoff_grows_and_is_capped() {
        let policy = policy(config(5, 100, Some(300)));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_millis(300));
    }

    #[test]
    fn test_backoff_without_cap_saturates() {
        let policy = policy(config(5, 100, None));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut cfg = config(3, 100, Some(1_000));
        cfg.jitter = true;
        let policy = policy(cfg);
        for _ in 0..200 {
            let delay = policy.delay_for_attempt(0);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay < Duration::from_millis(150));
        }
        // Already at the cap, jitter cannot exceed it
        for _ in 0..50 {
            assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(1_000));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures() {
        let policy = policy(config(4, 100, None));
        let token = CancellationToken::new();
        let mut calls = 0;

        let result = policy
            .execute(&token, || {
                calls += 1;
                let call = calls;
                async move {
                    if call < 3 {
                        Err(ScrapeError::Source(anyhow!("boom {call}")))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_error() {
        let policy = policy(config(3, 10, None));
        let token = CancellationToken::new();
        let mut calls = 0;

        let result: Result<(), _> = policy
            .execute(&token, || {
                calls += 1;
                let call = calls;
                async move { Err(ScrapeError::Source(anyhow!("failure {call}"))) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, ScrapeError::Source(_)));
        assert!(err.to_string().contains("failure 3"));
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_is_retried() {
        let policy = policy(config(2, 10, None));
        let token = CancellationToken::new();
        let mut calls = 0;

        let result = policy
            .execute(&token, || {
                calls += 1;
                let call = calls;
                async move {
                    if call == 1 {
                        Err(ScrapeError::NoDataFound {
                            source_id: "dbs".to_string(),
                        })
                    } else {
                        Ok(vec![1, 2])
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), vec![1, 2]);
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let policy = policy(config(5, 10, None));
        let token = CancellationToken::new();
        let mut calls = 0;

        let result: Result<(), _> = policy
            .execute(&token, || {
                calls += 1;
                async { Err(ScrapeError::UnknownSource("nope".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::UnknownSource(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_classifier() {
        fn never(_: &ScrapeError) -> bool {
            false
        }
        let policy = policy(config(5, 10, None)).with_classifier(never);
        let token = CancellationToken::new();
        let mut calls = 0;

        let result: Result<(), _> = policy
            .execute(&token, || {
                calls += 1;
                async { Err(ScrapeError::Timeout(Duration::from_secs(1))) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::Timeout(_))));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = policy(config(3, 10_000, None));
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let started = Instant::now();
        let mut calls = 0;
        let result: Result<(), _> = policy
            .execute(&token, || {
                calls += 1;
                async { Err(ScrapeError::Source(anyhow!("down"))) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::Cancelled)));
        assert_eq!(calls, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let policy = policy(config(3, 10, None));
        let token = CancellationToken::new();
        token.cancel();
        let mut calls = 0;

        let result: Result<(), _> = policy
            .execute(&token, || {
                calls += 1;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(ScrapeError::Cancelled)));
        assert_eq!(calls, 0);
    }
}
