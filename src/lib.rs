//! Resilience and validation gateway for external ML inference services.

pub mod admin;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod validation;

pub use config::schema::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::{MlGateway, Orchestrator, Registry, RequestContext};
pub use lifecycle::Shutdown;
pub use validation::Envelope;
