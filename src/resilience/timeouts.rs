//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a single attempt with its fixed deadline (inference, health ping)
//! - Wrap a whole call with the caller's optional overall deadline
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities, so paused-clock tests see virtual time
//! - A per-attempt timeout is retryable; an overall deadline is not

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{GatewayError, Result};

/// Bound one attempt. Elapsing yields [`GatewayError::Timeout`].
pub async fn with_timeout<F, T>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}

/// Bound a whole call by an absolute deadline, if any.
///
/// The inner future is dropped when the deadline passes, which cancels any
/// retry wait in progress. Elapsing yields [`GatewayError::DeadlineExceeded`].
pub async fn with_deadline<F, T>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        None => fut.await,
        Some(deadline) => match tokio::time::timeout_at(deadline, fut).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::DeadlineExceeded),
        },
    }
}
