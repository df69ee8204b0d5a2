//! Mediates every ML call: availability gate, circuit-guarded retrying
//! call, schema validation. Always resolves to an envelope.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GatewayError, Result};
use crate::gateway::registry::Registry;
use crate::observability::metrics;
use crate::observability::tracing::request_span;
use crate::observability::{Outcome, TelemetryEvent};
use crate::resilience::timeouts::with_deadline;
use crate::resilience::CircuitState;
use crate::validation::{Envelope, ResponseValidator};

/// Per-call context supplied by the caller.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    /// Overall deadline; aborts an in-flight retry loop when it passes.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    /// Uses `correlation_id` when given, otherwise generates a UUID v4.
    pub fn new(correlation_id: Option<String>) -> Self {
        Self {
            correlation_id: correlation_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, budget: Duration) -> Self {
        self.with_deadline(Instant::now() + budget)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(None)
    }
}

/// What the orchestrator produced for one call.
#[derive(Debug, Clone)]
pub struct Execution {
    pub envelope: Envelope,
    pub outcome: Outcome,
    pub duration: Duration,
}

#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<Registry>,
    validator: ResponseValidator,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>) -> Self {
        let validator = ResponseValidator::new(registry.gateway().clone());
        Self::with_validator(registry, validator)
    }

    pub fn with_validator(registry: Arc<Registry>, validator: ResponseValidator) -> Self {
        Self { registry, validator }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Run `call` for `service`/`operation` under the full resilience stack.
    ///
    /// `call` is not invoked when the health checker reports the service
    /// unavailable or its circuit is open. Never fails.
    pub async fn execute<F, Fut>(
        &self,
        service: &str,
        operation: &str,
        ctx: &RequestContext,
        call: F,
    ) -> Execution
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let span = request_span(service, operation, &ctx.correlation_id);
        async {
            let started = Instant::now();
            let (envelope, outcome) = self.run(service, operation, ctx, call).await;
            let duration = started.elapsed();

            TelemetryEvent {
                service: service.to_string(),
                operation: operation.to_string(),
                outcome,
                duration,
                correlation_id: ctx.correlation_id.clone(),
            }
            .emit();

            Execution {
                envelope,
                outcome,
                duration,
            }
        }
        .instrument(span)
        .await
    }

    async fn run<F, Fut>(
        &self,
        service: &str,
        operation: &str,
        ctx: &RequestContext,
        call: F,
    ) -> (Envelope, Outcome)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let health = self.registry.health();
        if !health.is_service_available(service) {
            tracing::warn!("Service unavailable, returning degraded response");
            metrics::record_error(service, operation, "unavailable");
            return (health.degraded_response(service, operation), Outcome::Degraded);
        }

        let breaker = self.registry.breaker(service);
        let result = with_deadline(ctx.deadline, breaker.execute(call)).await;

        match result {
            Ok(raw) => {
                let report = self.validator.validate_response(&raw, service, operation);
                match (report.sanitized, report.error) {
                    (Some(envelope), _) => (envelope, Outcome::Success),
                    (None, error) => {
                        let error = error.unwrap_or_default();
                        self.validator.raise_alert(service, operation, &error, &raw);
                        metrics::record_error(service, operation, "schema");
                        (self.validator.safe_default(service, operation), Outcome::Error)
                    }
                }
            }
            Err(GatewayError::CircuitOpen { .. }) => {
                tracing::warn!("Circuit breaker open, returning degraded response");
                metrics::record_circuit_state(service, CircuitState::Open);
                metrics::record_error(service, operation, "circuit_open");
                let envelope = self.degraded(service, operation, "Circuit breaker is open");
                (envelope, Outcome::CircuitOpen)
            }
            Err(err) => {
                tracing::error!(error = %err, class = err.class(), "ML service call failed");
                metrics::record_error(service, operation, err.class());
                let envelope = self.degraded(service, operation, &err.to_string());
                (envelope, Outcome::Error)
            }
        }
    }

    fn degraded(&self, service: &str, operation: &str, reason: &str) -> Envelope {
        Envelope::degraded(self.registry.gateway(), service, operation, reason)
    }
}
