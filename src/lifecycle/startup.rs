//! Startup readiness gate.
//!
//! # Design Decisions
//! - Fail fast: a required service that never became ready is fatal
//! - Optional services only gate their own features and are logged
//! - This is the only blocking step before the gateway serves calls

use thiserror::Error;

use crate::gateway::Registry;
use crate::health::ReadinessReport;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required ML services unavailable: {}", .0.join(", "))]
    RequiredServicesUnavailable(Vec<String>),
}

/// Run the readiness probe and classify failures by `required`.
///
/// Returns the probe report when every required service is up.
pub async fn readiness_gate(registry: &Registry) -> Result<ReadinessReport, StartupError> {
    tracing::info!("Checking ML service readiness");
    let report = registry.health().perform_readiness_probe().await;

    if report.ready {
        tracing::info!("All ML services ready");
        return Ok(report);
    }

    let (required, optional): (Vec<String>, Vec<String>) = report
        .unavailable_services
        .iter()
        .cloned()
        .partition(|name| registry.descriptor(name).is_some_and(|d| d.required));

    if !optional.is_empty() {
        tracing::warn!(
            services = ?optional,
            "Optional ML services unavailable; their features are disabled until they recover"
        );
    }

    if !required.is_empty() {
        tracing::error!(services = ?required, "Required ML services unavailable");
        return Err(StartupError::RequiredServicesUnavailable(required));
    }

    Ok(report)
}
