//! Per-service health record.
//!
//! # States
//! - Unknown: never probed
//! - Healthy: last probe answered 200
//! - Unhealthy: last probe failed
//!
//! # Design Decisions
//! - One success clears the failure streak (no hysteresis)
//! - `available` mirrors the last probe and is written only by the checker

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub status: HealthStatus,
    pub available: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub response_time_ms: Option<u64>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            available: false,
            last_check: None,
            last_success: None,
            consecutive_failures: 0,
            last_error: None,
            response_time_ms: None,
        }
    }
}

impl HealthRecord {
    pub(crate) fn record_success(&mut self, now: DateTime<Utc>, response_time: Duration) {
        self.status = HealthStatus::Healthy;
        self.available = true;
        self.last_check = Some(now);
        self.last_success = Some(now);
        self.consecutive_failures = 0;
        self.last_error = None;
        self.response_time_ms = Some(response_time.as_millis() as u64);
    }

    /// Available without a probe result; status stays as it was.
    pub(crate) fn assume_available(&mut self) {
        self.available = true;
    }

    /// Returns the new failure streak.
    pub(crate) fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        reason: String,
        response_time: Duration,
    ) -> u32 {
        self.status = HealthStatus::Unhealthy;
        self.available = false;
        self.last_check = Some(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(reason);
        self.response_time_ms = Some(response_time.as_millis() as u64);
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_then_recovery() {
        let mut record = HealthRecord::default();
        assert_eq!(record.status, HealthStatus::Unknown);
        assert!(!record.available);

        let now = Utc::now();
        assert_eq!(record.record_failure(now, "HTTP 503".into(), Duration::from_millis(12)), 1);
        assert_eq!(record.record_failure(now, "HTTP 503".into(), Duration::from_millis(12)), 2);
        assert_eq!(record.status, HealthStatus::Unhealthy);
        assert!(record.last_success.is_none());

        record.record_success(now, Duration::from_millis(8));
        assert_eq!(record.status, HealthStatus::Healthy);
        assert!(record.available);
        assert_eq!(record.consecutive_failures, 0);
        assert!(record.last_error.is_none());
        assert_eq!(record.response_time_ms, Some(8));
    }
}
