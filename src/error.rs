//! Error taxonomy for calls to downstream ML services.
//!
//! Every lower layer (transport, retry, circuit breaker, validator, health
//! gate) reports failures as a [`GatewayError`]. Only the orchestrator turns
//! them into a final envelope; nothing here is surfaced raw to a caller.

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Network-level failure class, mirroring the socket errors worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    ConnectionReset,
    ConnectionRefused,
    Unreachable,
    DnsFailure,
}

impl fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NetworkErrorKind::ConnectionReset => "connection reset",
            NetworkErrorKind::ConnectionRefused => "connection refused",
            NetworkErrorKind::Unreachable => "host unreachable",
            NetworkErrorKind::DnsFailure => "dns failure",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while mediating an ML service call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transient socket-level failure (reset, refused, unreachable, DNS).
    #[error("network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// The per-attempt deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Downstream answered with a 5xx status.
    #[error("server error: HTTP {status}")]
    Server { status: u16 },

    /// Downstream answered with 429.
    #[error("rate limited: HTTP 429")]
    RateLimited,

    /// Downstream answered with a 4xx other than 429.
    #[error("client error: HTTP {status}")]
    Client { status: u16 },

    /// Raised only by the circuit breaker; the wrapped call was not made.
    #[error("circuit breaker is open for {service}")]
    CircuitOpen { service: String },

    /// Raised only by the response validator.
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),

    /// The health gate already knows the service is down.
    #[error("service {service} unavailable: {reason}")]
    ServiceUnavailable { service: String, reason: String },

    /// The caller's overall deadline passed before a result was produced.
    #[error("upstream deadline exceeded")]
    DeadlineExceeded,

    /// A 2xx body that is not JSON.
    #[error("failed to decode response body: {0}")]
    Decode(String),

    /// The request could not be built (bad URL, bad header value).
    #[error("invalid request: {0}")]
    Request(String),
}

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Network failures, timeouts, 5xx and 429 are retryable. Everything
    /// else propagates after the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Network { .. }
                | GatewayError::Timeout(_)
                | GatewayError::Server { .. }
                | GatewayError::RateLimited
        )
    }

    /// Stable label used for the error-count metric.
    pub fn class(&self) -> &'static str {
        match self {
            GatewayError::Network { .. } => "network",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Server { .. } => "server",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Client { .. } => "client",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::SchemaValidation(_) => "schema",
            GatewayError::ServiceUnavailable { .. } => "unavailable",
            GatewayError::DeadlineExceeded => "deadline",
            GatewayError::Decode(_) => "decode",
            GatewayError::Request(_) => "request",
        }
    }

    /// Map an HTTP status outside 2xx onto the taxonomy.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => GatewayError::RateLimited,
            500..=599 => GatewayError::Server { status },
            _ => GatewayError::Client { status },
        }
    }

    /// Classify a `reqwest` failure.
    ///
    /// `timeout` is the per-attempt deadline that was configured on the
    /// request, reported back in [`GatewayError::Timeout`].
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return GatewayError::Timeout(timeout);
        }
        if let Some(status) = err.status() {
            return GatewayError::from_status(status.as_u16());
        }
        if err.is_builder() {
            return GatewayError::Request(err.to_string());
        }
        if err.is_decode() {
            return GatewayError::Decode(err.to_string());
        }

        let message = error_chain(&err);
        if let Some(kind) = io_kind(&err) {
            match kind {
                io::ErrorKind::TimedOut => return GatewayError::Timeout(timeout),
                io::ErrorKind::ConnectionRefused => {
                    return GatewayError::Network {
                        kind: NetworkErrorKind::ConnectionRefused,
                        message,
                    }
                }
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => {
                    return GatewayError::Network {
                        kind: NetworkErrorKind::ConnectionReset,
                        message,
                    }
                }
                _ => {}
            }
        }

        let kind = if message.contains("dns error") || message.contains("failed to lookup") {
            NetworkErrorKind::DnsFailure
        } else if err.is_connect() {
            NetworkErrorKind::Unreachable
        } else {
            // Body/transport errors mid-response: the connection went away.
            NetworkErrorKind::ConnectionReset
        };
        GatewayError::Network { kind, message }
    }
}

/// First `io::ErrorKind` found in the source chain.
fn io_kind(err: &(dyn StdError + 'static)) -> Option<io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        source = inner.source();
    }
    None
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(GatewayError::Server { status: 503 }.is_retryable());
        assert!(GatewayError::RateLimited.is_retryable());
        assert!(GatewayError::Network {
            kind: NetworkErrorKind::DnsFailure,
            message: "dns error".into(),
        }
        .is_retryable());

        assert!(!GatewayError::Client { status: 404 }.is_retryable());
        assert!(!GatewayError::CircuitOpen { service: "identity".into() }.is_retryable());
        assert!(!GatewayError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(GatewayError::from_status(429), GatewayError::RateLimited));
        assert!(matches!(GatewayError::from_status(502), GatewayError::Server { status: 502 }));
        assert!(matches!(GatewayError::from_status(404), GatewayError::Client { status: 404 }));
        assert!(matches!(GatewayError::from_status(401), GatewayError::Client { status: 401 }));
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::CircuitOpen { service: "appCrawler".into() };
        assert_eq!(err.to_string(), "circuit breaker is open for appCrawler");
        assert_eq!(err.class(), "circuit_open");
    }
}
