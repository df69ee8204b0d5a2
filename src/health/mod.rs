//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Periodic worker (checker.rs):
//!     Interval tick (first one immediate)
//!     → Probe every service's /health
//!     → Update state.rs records
//!
//! Startup (checker.rs readiness probe):
//!     Probe with increasing backoff
//!     → {ready, unavailable_services}
//!
//! Orchestrator:
//!     is_service_available(name) before any outbound call
//! ```
//!
//! # Design Decisions
//! - Only the checker writes availability
//! - Health state is per-service
//! - The worker is an explicit task with a stop signal

pub mod checker;
pub mod state;

pub use checker::{HealthChecker, HealthProbe, HealthReport, HttpHealthProbe, ReadinessReport};
pub use state::{HealthRecord, HealthStatus};
