//! Per-call telemetry emitted by the orchestrator on every path.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::observability::metrics;

/// How an orchestrated call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Degraded,
    Error,
    CircuitOpen,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Degraded => "degraded",
            Outcome::Error => "error",
            Outcome::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub service: String,
    pub operation: String,
    pub outcome: Outcome,
    pub duration: Duration,
    pub correlation_id: String,
}

impl TelemetryEvent {
    /// Write the structured log line and update request metrics.
    pub fn emit(&self) {
        let duration_ms = self.duration.as_millis() as u64;
        match self.outcome {
            Outcome::Success => info!(
                service = %self.service,
                operation = %self.operation,
                outcome = %self.outcome,
                duration_ms,
                correlation_id = %self.correlation_id,
                "ML request completed"
            ),
            _ => warn!(
                service = %self.service,
                operation = %self.operation,
                outcome = %self.outcome,
                duration_ms,
                correlation_id = %self.correlation_id,
                "ML request completed"
            ),
        }

        metrics::record_request(&self.service, &self.operation, self.outcome.as_str(), self.duration);
    }
}
