//! Response validation subsystem.
//!
//! # Data Flow
//! ```text
//! raw JSON from an ML service
//!     → validator.rs stage 1 (envelope shape, envelope.rs types)
//!     → validator.rs stage 2 (typed result, schema.rs)
//!     → sanitized Envelope, or a safe default on rejection
//! ```
//!
//! # Design Decisions
//! - Nothing unvalidated reaches a caller; raw payloads are only logged
//! - Results are strongly typed per (service, operation)
//! - Unknown envelope keys are violations, unknown result keys are stripped

pub mod envelope;
pub mod schema;
pub mod validator;

pub use envelope::{Envelope, EnvelopeStatus, ErrorBody, Meta};
pub use schema::{OperationResult, Ratio};
pub use validator::{AlertHook, LogAlertHook, ResponseValidator, SchemaAlert, ValidationReport};
