use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::admin::AppState;
use crate::health::HealthRecord;
use crate::resilience::CircuitSnapshot;

#[derive(Serialize)]
pub struct SystemStatus {
    pub name: String,
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub required: bool,
    #[serde(flatten)]
    pub record: HealthRecord,
}

#[derive(Serialize)]
pub struct GatewayHealth {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, ServiceHealth>,
    pub circuits: Vec<CircuitSnapshot>,
    pub critical_issues: Vec<String>,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        name: state.registry.gateway().name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

/// 200 while every required service is up, 503 otherwise.
pub async fn get_health(State(state): State<AppState>) -> (StatusCode, Json<GatewayHealth>) {
    let report = state.registry.health().status();

    let mut critical_issues = Vec::new();
    let mut services = BTreeMap::new();
    for (name, record) in report.services {
        let required = state
            .registry
            .descriptor(&name)
            .is_some_and(|d| d.required);
        if required && !record.available {
            let reason = record.last_error.as_deref().unwrap_or("not yet checked");
            critical_issues.push(format!("{name} unavailable: {reason}"));
        }
        services.insert(name, ServiceHealth { required, record });
    }

    let (code, status) = if critical_issues.is_empty() {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = GatewayHealth {
        status,
        timestamp: report.timestamp,
        services,
        circuits: state.registry.circuit_snapshots(),
        critical_issues,
    };
    (code, Json(body))
}
