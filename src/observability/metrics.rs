//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ml_requests_total` (counter): orchestrated calls by service, operation, outcome
//! - `ml_request_duration_seconds` (histogram): end-to-end orchestrated latency
//! - `ml_errors_total` (counter): failures by service, operation, error class
//! - `ml_circuit_breaker_state` (gauge): 0=closed, 1=open, 2=half-open
//! - `ml_service_available` (gauge): 1=available, 0=unavailable
//! - `ml_schema_violations_total` (counter): rejected downstream payloads
//!
//! # Design Decisions
//! - Core code only talks to the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is installed once by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use crate::resilience::CircuitState;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    let builder = match builder.set_buckets_for_metric(
        Matcher::Full("ml_request_duration_seconds".to_string()),
        &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0],
    ) {
        Ok(builder) => builder,
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure metric buckets");
            return;
        }
    };

    match builder.install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics exporter listening");
        }
        Err(e) => tracing::error!(error = %e, address = %addr, "Failed to install metrics exporter"),
    }
}

fn describe_metrics() {
    describe_counter!("ml_requests_total", "Total orchestrated ML service calls");
    describe_histogram!(
        "ml_request_duration_seconds",
        "Orchestrated ML call duration in seconds"
    );
    describe_counter!("ml_errors_total", "Failed ML service calls by error class");
    describe_gauge!(
        "ml_circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=open, 2=half-open)"
    );
    describe_gauge!("ml_service_available", "Health checker availability (1=up)");
    describe_counter!(
        "ml_schema_violations_total",
        "Downstream payloads rejected by the response validator"
    );
}

pub fn record_request(service: &str, operation: &str, outcome: &str, duration: Duration) {
    counter!(
        "ml_requests_total",
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        "ml_request_duration_seconds",
        "service" => service.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_error(service: &str, operation: &str, class: &str) {
    counter!(
        "ml_errors_total",
        "service" => service.to_string(),
        "operation" => operation.to_string(),
        "class" => class.to_string()
    )
    .increment(1);
}

pub fn record_circuit_state(service: &str, state: CircuitState) {
    gauge!("ml_circuit_breaker_state", "service" => service.to_string()).set(state.as_gauge());
}

pub fn record_service_available(service: &str, available: bool) {
    let value = if available { 1.0 } else { 0.0 };
    gauge!("ml_service_available", "service" => service.to_string()).set(value);
}

pub fn record_schema_violation(service: &str, operation: &str) {
    counter!(
        "ml_schema_violations_total",
        "service" => service.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}
