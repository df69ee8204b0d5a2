//! The response envelope every ML service call resolves to.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::schema::GatewayInfo;
use crate::validation::schema::OperationResult;

/// Error code for envelopes built when a service cannot be reached.
pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";

/// Error code for safe-default envelopes.
pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub service: String,
    /// ISO-8601, kept verbatim from the downstream payload.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Meta {
    /// Meta for an envelope produced by the gateway itself.
    pub fn gateway(info: &GatewayInfo) -> Self {
        Self {
            service: info.name.clone(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            version: info.version.clone(),
        }
    }
}

/// `{status, result?, error?, meta}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub status: EnvelopeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OperationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

impl Envelope {
    /// Placeholder returned when a service is down or its circuit is open.
    pub fn degraded(info: &GatewayInfo, service: &str, operation: &str, reason: &str) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            result: None,
            error: Some(ErrorBody {
                code: SERVICE_UNAVAILABLE.to_string(),
                message: format!("{service} service is temporarily unavailable"),
                details: Some(json!({
                    "service": service,
                    "operation": operation,
                    "reason": reason,
                })),
            }),
            meta: Meta::gateway(info),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_envelope_shape() {
        let info = GatewayInfo::default();
        let envelope = Envelope::degraded(&info, "identity", "verify", "Service unreachable");
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], SERVICE_UNAVAILABLE);
        assert_eq!(value["error"]["details"]["reason"], "Service unreachable");
        assert_eq!(value["meta"]["service"], "api-gateway");
        assert!(value.get("result").is_none());
        assert!(value["meta"].get("version").is_none());
        assert!(chrono::DateTime::parse_from_rfc3339(value["meta"]["timestamp"].as_str().unwrap()).is_ok());
    }
}
