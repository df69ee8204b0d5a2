//! Circuit breaker for downstream ML services.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: service assumed down, requests fail fast
//! - Half-Open: testing if the service recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures within monitoring_period >= failure_threshold
//! Open → Half-Open: first call after the cooldown
//! Half-Open → Closed: success_threshold consecutive trial successes
//! Half-Open → Open: any trial failure (fresh cooldown)
//! ```
//!
//! # Design Decisions
//! - One breaker per service name, owned by the registry
//! - Fail fast in Open state (the wrapped call is never made)
//! - Single trial in Half-Open; concurrent callers fail fast
//! - A call dropped before completing is neither a success nor a failure
//! - Results are settled against the generation the call was admitted in;
//!   a call that outlives a state transition is ignored

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{GatewayError, Result};
use crate::observability::metrics;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        };
        f.write_str(s)
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub service: String,
    pub state: CircuitState,
    /// Failures currently inside the monitoring window.
    pub failure_count: u32,
    /// Consecutive half-open successes.
    pub success_count: u32,
    /// Remaining cooldown while open.
    pub retry_after_ms: Option<u64>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: VecDeque<Instant>,
    success_count: u32,
    next_attempt_at: Option<Instant>,
    trial_in_flight: bool,
    /// Bumped on every state transition.
    generation: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            success_count: 0,
            next_attempt_at: None,
            trial_in_flight: false,
            generation: 0,
        }
    }

    /// Back to closed with counters cleared, in a new generation.
    fn close(&mut self) {
        let generation = self.generation + 1;
        *self = Inner::new();
        self.generation = generation;
    }

    fn prune(&mut self, now: Instant, period: Duration) {
        while let Some(front) = self.failures.front() {
            if now.saturating_duration_since(*front) >= period {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Per-service CLOSED/OPEN/HALF_OPEN guard.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let service = service.into();
        metrics::record_circuit_state(&service, CircuitState::Closed);
        Self {
            service,
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Run `operation` under the breaker.
    ///
    /// Fails with [`GatewayError::CircuitOpen`] without calling `operation`
    /// while the circuit is open or a half-open trial is already running.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.acquire()?;
        match operation().await {
            Ok(value) => {
                permit.success();
                Ok(value)
            }
            Err(err) => {
                permit.failure(&err);
                Err(err)
            }
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Open and still cooling down. Once the cooldown has passed the next
    /// call is let through as a trial, so this reports `false`.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        inner.state == CircuitState::Open
            && inner
                .next_attempt_at
                .is_some_and(|at| Instant::now() < at)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = Instant::now();
        let period = self.config.monitoring_period();
        let inner = self.lock();
        let failure_count = inner
            .failures
            .iter()
            .filter(|t| now.saturating_duration_since(**t) < period)
            .count() as u32;
        let retry_after_ms = match (inner.state, inner.next_attempt_at) {
            (CircuitState::Open, Some(at)) => {
                Some(at.saturating_duration_since(now).as_millis() as u64)
            }
            _ => None,
        };

        CircuitSnapshot {
            service: self.service.clone(),
            state: inner.state,
            failure_count,
            success_count: inner.success_count,
            retry_after_ms,
        }
    }

    /// Force the breaker back to closed with all counters cleared.
    pub fn reset(&self) {
        self.lock().close();
        info!(service = %self.service, "Circuit breaker reset");
        metrics::record_circuit_state(&self.service, CircuitState::Closed);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire(&self) -> Result<Permit<'_>> {
        let now = Instant::now();
        let mut inner = self.lock();

        let state = inner.state;
        match state {
            CircuitState::Closed => Ok(Permit::new(self, false, inner.generation)),
            CircuitState::Open => {
                let ready = inner.next_attempt_at.map_or(true, |at| now >= at);
                if !ready {
                    return Err(self.open_error());
                }
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                inner.trial_in_flight = true;
                inner.generation += 1;
                let generation = inner.generation;
                drop(inner);
                info!(service = %self.service, "Circuit breaker half-open, attempting trial call");
                metrics::record_circuit_state(&self.service, CircuitState::HalfOpen);
                Ok(Permit::new(self, true, generation))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(self.open_error());
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true, inner.generation))
            }
        }
    }

    fn open_error(&self) -> GatewayError {
        GatewayError::CircuitOpen {
            service: self.service.clone(),
        }
    }

    fn on_success(&self, trial: bool, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(service = %self.service, "Ignoring success from a previous circuit state");
            return;
        }
        if trial {
            inner.trial_in_flight = false;
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => inner.failures.clear(),
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.close();
                    drop(inner);
                    info!(service = %self.service, "Circuit breaker closed");
                    metrics::record_circuit_state(&self.service, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, trial: bool, generation: u64, err: &GatewayError) {
        let now = Instant::now();
        let mut inner = self.lock();
        if inner.generation != generation {
            debug!(service = %self.service, error = %err, "Ignoring failure from a previous circuit state");
            return;
        }
        if trial {
            inner.trial_in_flight = false;
        }

        let state = inner.state;
        match state {
            CircuitState::Closed => {
                inner.prune(now, self.config.monitoring_period());
                inner.failures.push_back(now);
                let failures = inner.failures.len() as u32;
                if failures >= self.config.failure_threshold {
                    self.trip(inner, now);
                    warn!(
                        service = %self.service,
                        failures,
                        cooldown_ms = self.config.timeout_ms,
                        error = %err,
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.trip(inner, now);
                warn!(
                    service = %self.service,
                    cooldown_ms = self.config.timeout_ms,
                    error = %err,
                    "Circuit breaker reopened from half-open"
                );
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, mut inner: MutexGuard<'_, Inner>, now: Instant) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.trial_in_flight = false;
        inner.next_attempt_at = Some(now + self.config.timeout());
        inner.generation += 1;
        drop(inner);
        metrics::record_circuit_state(&self.service, CircuitState::Open);
    }

    fn release_trial(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen && inner.generation == generation {
            inner.trial_in_flight = false;
        }
    }
}

/// Admission for one call. Dropping an unsettled trial permit frees the
/// half-open slot without counting a result.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    generation: u64,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool, generation: u64) -> Self {
        Self {
            breaker,
            trial,
            generation,
            settled: false,
        }
    }

    fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial, self.generation);
    }

    fn failure(mut self, err: &GatewayError) {
        self.settled = true;
        self.breaker.on_failure(self.trial, self.generation, err);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.release_trial(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn config(failure_threshold: u32, success_threshold: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold,
            timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
        }
    }

    async fn fail(cb: &CircuitBreaker) -> Result<()> {
        cb.execute(|| async { Err(GatewayError::Server { status: 500 }) })
            .await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<()> {
        cb.execute(|| async { Ok(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold() {
        let cb = CircuitBreaker::new("identity", config(3, 2));

        for _ in 0..2 {
            let _ = fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_fails_fast() {
        let cb = CircuitBreaker::new("identity", config(1, 1));
        let _ = fail(&cb).await;

        let calls = &AtomicU32::new(0);
        let result: Result<()> = cb
            .execute(|| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(GatewayError::CircuitOpen { ref service }) if service == "identity"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(cb.snapshot().retry_after_ms.unwrap() <= 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_are_forgotten() {
        let cb = CircuitBreaker::new("complaint", config(3, 1));

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let _ = fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.snapshot().failure_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_window() {
        let cb = CircuitBreaker::new("complaint", config(3, 1));

        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_needs_success_threshold() {
        let cb = CircuitBreaker::new("appCrawler", config(1, 2));
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert_eq!(cb.snapshot().success_count, 1);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let cb = CircuitBreaker::new("appCrawler", config(1, 2));
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().success_count, 0);
        assert_eq!(cb.snapshot().retry_after_ms, Some(60_000));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(succeed(&cb).await, Err(GatewayError::CircuitOpen { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_half_open_trial() {
        let cb = CircuitBreaker::new("identity", config(1, 1));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let trial = cb.execute(|| async move {
            let _ = wait.await;
            Ok(())
        });
        let concurrent = async {
            tokio::task::yield_now().await;
            let result = succeed(&cb).await;
            let _ = release.send(());
            result
        };

        let (trial_result, concurrent_result) = tokio::join!(trial, concurrent);
        assert!(trial_result.is_ok());
        assert!(matches!(concurrent_result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let cb = CircuitBreaker::new("identity", config(1, 1));
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let pending = cb.execute(|| std::future::pending::<Result<()>>());
        let timed_out = tokio::time::timeout(Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    /// Runs until `release` fires, then resolves to `outcome`.
    async fn held(
        cb: &CircuitBreaker,
        release: tokio::sync::oneshot::Receiver<()>,
        outcome: Result<()>,
    ) -> Result<()> {
        cb.execute(|| async move {
            let _ = release.await;
            outcome
        })
        .await
    }

    async fn settle() {
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_does_not_close_half_open() {
        let cb = CircuitBreaker::new("appCrawler", config(1, 1));
        let (release_late, late_wait) = tokio::sync::oneshot::channel();
        let (release_trial, trial_wait) = tokio::sync::oneshot::channel();

        let late = held(&cb, late_wait, Ok(()));
        let driver = async {
            settle().await;
            let _ = fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Open);
            tokio::time::advance(Duration::from_secs(61)).await;

            let trial = held(&cb, trial_wait, Ok(()));
            let during_trial = async {
                settle().await;
                assert_eq!(cb.state(), CircuitState::HalfOpen);

                let _ = release_late.send(());
                settle().await;
                assert_eq!(cb.state(), CircuitState::HalfOpen);
                assert_eq!(cb.snapshot().success_count, 0);
                assert!(matches!(succeed(&cb).await, Err(GatewayError::CircuitOpen { .. })));

                let _ = release_trial.send(());
            };
            let (trial_result, ()) = tokio::join!(trial, during_trial);
            trial_result
        };

        let (late_result, trial_result) = tokio::join!(late, driver);
        assert!(late_result.is_ok());
        assert!(trial_result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_failure_does_not_reopen_half_open() {
        let cb = CircuitBreaker::new("appCrawler", config(1, 1));
        let (release_late, late_wait) = tokio::sync::oneshot::channel();
        let (release_trial, trial_wait) = tokio::sync::oneshot::channel();

        let late = held(&cb, late_wait, Err(GatewayError::Timeout(Duration::from_secs(30))));
        let driver = async {
            settle().await;
            let _ = fail(&cb).await;
            tokio::time::advance(Duration::from_secs(61)).await;

            let trial = held(&cb, trial_wait, Ok(()));
            let during_trial = async {
                settle().await;
                let _ = release_late.send(());
                settle().await;
                assert_eq!(cb.state(), CircuitState::HalfOpen);
                assert!(cb.snapshot().retry_after_ms.is_none());

                let _ = release_trial.send(());
            };
            let (trial_result, ()) = tokio::join!(trial, during_trial);
            trial_result
        };

        let (late_result, trial_result) = tokio::join!(late, driver);
        assert!(late_result.is_err());
        assert!(trial_result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_success_after_close_keeps_window() {
        let cb = CircuitBreaker::new("complaint", config(2, 1));
        let (release_late, late_wait) = tokio::sync::oneshot::channel();

        let late = held(&cb, late_wait, Ok(()));
        let driver = async {
            settle().await;
            let _ = fail(&cb).await;
            let _ = fail(&cb).await;
            tokio::time::advance(Duration::from_secs(61)).await;
            succeed(&cb).await.unwrap();
            assert_eq!(cb.state(), CircuitState::Closed);

            let _ = fail(&cb).await;
            let _ = release_late.send(());
            settle().await;
            // The late success belongs to the previous closed period.
            assert_eq!(cb.snapshot().failure_count, 1);
        };

        let (late_result, ()) = tokio::join!(late, driver);
        assert!(late_result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_open_only_during_cooldown() {
        let cb = CircuitBreaker::new("identity", config(1, 1));
        let _ = fail(&cb).await;
        assert!(cb.is_open());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aged_exactly_one_period_is_pruned() {
        let cb = CircuitBreaker::new("complaint", config(2, 1));
        let _ = fail(&cb).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cb.snapshot().failure_count, 0);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let cb = CircuitBreaker::new("identity", config(1, 1));
        let _ = fail(&cb).await;
        assert!(cb.is_open());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(succeed(&cb).await.is_ok());
    }
}
