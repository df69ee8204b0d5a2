//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build registry → Readiness gate → Start health worker
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop health worker → Stop admin server → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then registry, then background tasks
//! - Required services must be ready before the gateway reports ready

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{readiness_gate, StartupError};
