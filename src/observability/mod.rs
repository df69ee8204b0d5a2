//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (request span with correlation id)
//!
//! Orchestrator additionally produces:
//!     → telemetry.rs (one event per call: outcome + duration)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Correlation id flows into every log line of a call and downstream
//! - Metrics are cheap (facade calls, no-ops without a recorder)

pub mod logging;
pub mod metrics;
pub mod telemetry;
pub mod tracing;

pub use telemetry::{Outcome, TelemetryEvent};
