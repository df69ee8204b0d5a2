//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an ML service:
//!     → circuit_breaker.rs (fail fast while the service is tripped)
//!     → retries.rs (retry classified failures with backoff.rs delays)
//!     → timeouts.rs (every attempt has a deadline)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - The breaker wraps the whole retry loop, so one exhausted call is one failure
//! - All resilience logic is composable around a plain async closure

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{CircuitBreaker, CircuitSnapshot, CircuitState};
pub use retries::RetryHandler;
