//! Retry logic.
//!
//! # Responsibilities
//! - Determine if a failure is retryable (see [`GatewayError::is_retryable`])
//! - Execute retries with exponential backoff + jitter
//! - Re-raise the original error once retries are exhausted
//!
//! # Design Decisions
//! - Retry state lives on the stack of a single call; nothing is shared
//! - Waits are `tokio::time::sleep`, so other requests keep running
//! - Dropping the future (upstream deadline) stops the loop mid-wait

use std::future::Future;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::{GatewayError, Result};
use crate::resilience::backoff::calculate_backoff;

/// Retries a single async call according to a [`RetryConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetryHandler {
    config: RetryConfig,
}

impl RetryHandler {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether `err` warrants another attempt.
    pub fn is_retryable(&self, err: &GatewayError) -> bool {
        err.is_retryable()
    }

    /// Run `operation` up to `max_retries + 1` times.
    ///
    /// Returns the first success, or the last error unmodified. Errors that
    /// are not retryable are returned after a single attempt.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if !self.is_retryable(&err) || attempt >= self.config.max_retries {
                        return Err(err);
                    }

                    let delay = calculate_backoff(attempt, &self.config);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter_ratio: 0.0,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let handler = RetryHandler::new(no_jitter());
        let calls = &AtomicU32::new(0);

        let result: Result<()> = handler
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Client { status: 404 })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Client { status: 404 })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_timeouts_then_success() {
        let handler = RetryHandler::new(no_jitter());
        let calls = &AtomicU32::new(0);
        let seen = &Mutex::new(Vec::new());
        let start = Instant::now();

        let result = handler
            .execute(|| async move {
                seen.lock().unwrap().push(start.elapsed());
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(GatewayError::Timeout(Duration::from_secs(30))),
                    _ => Ok("done"),
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let seen = seen.lock().unwrap().clone();
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert_eq!(first_gap, Duration::from_millis(1000));
        assert_eq!(second_gap, Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_original_error() {
        let handler = RetryHandler::new(RetryConfig {
            max_retries: 2,
            ..no_jitter()
        });
        let calls = &AtomicU32::new(0);

        let result: Result<()> = handler
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Server { status: 503 })
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Server { status: 503 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delays_never_exceed_max() {
        let handler = RetryHandler::new(RetryConfig {
            max_retries: 6,
            initial_delay_ms: 1000,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.0,
        });
        let seen = &Mutex::new(Vec::new());
        let start = Instant::now();

        let _: Result<()> = handler
            .execute(|| async move {
                seen.lock().unwrap().push(start.elapsed());
                Err(GatewayError::RateLimited)
            })
            .await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 7);
        let gaps: Vec<_> = seen.windows(2).map(|w| w[1] - w[0]).collect();
        for pair in gaps.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
        assert!(gaps.iter().all(|g| *g <= Duration::from_millis(3000)));
    }
}
