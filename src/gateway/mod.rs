//! ML gateway core.
//!
//! # Data Flow
//! ```text
//! capabilities.rs (categorize_text, verify_identity, ...)
//!     → orchestrator.rs
//!         → HealthChecker::is_service_available (no call when down)
//!         → CircuitBreaker::execute
//!             → transport.rs Retrying<HttpTransport> (retry decorator)
//!         → ResponseValidator (sanitize or safe default)
//!     → Envelope (never an error)
//! ```
//!
//! # Design Decisions
//! - One `Registry` is built at startup and passed in explicitly
//! - Retry is composed into the transport when the client is built
//! - Every path emits one telemetry event

pub mod capabilities;
pub mod orchestrator;
pub mod registry;
pub mod transport;

pub use capabilities::{AppVerificationRequest, IdentityVerificationRequest, MlGateway};
pub use orchestrator::{Execution, Orchestrator, RequestContext};
pub use registry::Registry;
pub use transport::{FileUpload, HttpTransport, OutboundRequest, RequestBody, Retrying, Transport};
