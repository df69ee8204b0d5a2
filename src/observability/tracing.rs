//! Request spans.
//!
//! Every orchestrated call runs inside one span carrying its correlation id,
//! so retry, breaker and validator events inherit it.

use ::tracing::{info_span, Span};

/// Header carrying the correlation id to downstream services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Span for one orchestrated ML call.
pub fn request_span(service: &str, operation: &str, correlation_id: &str) -> Span {
    info_span!(
        "ml_request",
        service = %service,
        operation = %operation,
        correlation_id = %correlation_id,
    )
}
