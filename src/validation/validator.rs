//! Two-stage validation of untrusted ML service payloads.
//!
//! Stage 1 checks the envelope: known keys only, `status`, conditional
//! `result`/`error`, and `meta` with an ISO-8601 timestamp. Stage 2 runs on
//! success envelopes and parses `result` into the typed payload registered
//! for the (service, operation) pair.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::error;

use crate::config::schema::GatewayInfo;
use crate::observability::metrics;
use crate::validation::envelope::{Envelope, EnvelopeStatus, ErrorBody, Meta, VALIDATION_FAILED};
use crate::validation::schema::{safe_default_message, safe_default_result, Operation};

const ENVELOPE_KEYS: &[&str] = &["status", "result", "error", "meta"];
const ERROR_KEYS: &[&str] = &["code", "message", "details"];
const META_KEYS: &[&str] = &["service", "timestamp", "version"];

/// Outcome of [`ResponseValidator::validate_response`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub error: Option<String>,
    pub sanitized: Option<Envelope>,
}

impl ValidationReport {
    fn rejected(error: String) -> Self {
        Self {
            valid: false,
            error: Some(error),
            sanitized: None,
        }
    }
}

/// A schema violation worth paging someone about.
#[derive(Debug)]
pub struct SchemaAlert<'a> {
    pub service: &'a str,
    pub operation: &'a str,
    pub error: &'a str,
    pub payload: &'a Value,
}

/// Receives schema alerts. The default implementation logs them.
pub trait AlertHook: Send + Sync {
    fn schema_alert(&self, alert: &SchemaAlert<'_>);
}

#[derive(Debug, Default)]
pub struct LogAlertHook;

impl AlertHook for LogAlertHook {
    fn schema_alert(&self, alert: &SchemaAlert<'_>) {
        error!(
            alert = true,
            service = %alert.service,
            operation = %alert.operation,
            error = %alert.error,
            payload = %alert.payload,
            "ALERT: ML response schema validation failed"
        );
    }
}

#[derive(Clone)]
pub struct ResponseValidator {
    gateway: GatewayInfo,
    alert: Arc<dyn AlertHook>,
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl ResponseValidator {
    pub fn new(gateway: GatewayInfo) -> Self {
        Self::with_alert_hook(gateway, Arc::new(LogAlertHook))
    }

    pub fn with_alert_hook(gateway: GatewayInfo, alert: Arc<dyn AlertHook>) -> Self {
        Self { gateway, alert }
    }

    /// Validate and sanitize a raw downstream payload.
    ///
    /// On any violation the report carries `valid = false` and no
    /// sanitized envelope; the raw payload is only logged.
    ///
    /// A success result is only forwarded as a typed
    /// [`OperationResult`](crate::validation::OperationResult).
    /// A `(service, operation)` pair with no registered result schema has no
    /// typed form, so its success envelopes are rejected rather than passed
    /// through unchecked.
    pub fn validate_response(&self, raw: &Value, service: &str, operation: &str) -> ValidationReport {
        let report = match check(raw, service, operation) {
            Ok(envelope) => ValidationReport {
                valid: true,
                error: None,
                sanitized: Some(envelope),
            },
            Err(violations) => ValidationReport::rejected(violations.join("; ")),
        };

        if let Some(reason) = &report.error {
            error!(
                service = %service,
                operation = %operation,
                error = %reason,
                payload = %raw,
                "ML response schema validation failed"
            );
            metrics::record_schema_violation(service, operation);
        }
        report
    }

    /// Gate for persisting a payload. Fires the alert hook on rejection.
    pub fn validate_for_db_write(&self, raw: &Value, service: &str, operation: &str) -> bool {
        let report = self.validate_response(raw, service, operation);
        match report.error {
            None => true,
            Some(reason) => {
                error!(
                    service = %service,
                    operation = %operation,
                    "Rejecting DB write due to invalid ML response"
                );
                self.raise_alert(service, operation, &reason, raw);
                false
            }
        }
    }

    pub fn raise_alert(&self, service: &str, operation: &str, error: &str, payload: &Value) {
        self.alert.schema_alert(&SchemaAlert {
            service,
            operation,
            error,
            payload,
        });
    }

    /// Deterministic conservative envelope for a rejected payload.
    pub fn safe_default(&self, service: &str, operation: &str) -> Envelope {
        let op = Operation::lookup(service, operation);
        Envelope {
            status: EnvelopeStatus::Error,
            result: op.map(safe_default_result),
            error: Some(ErrorBody {
                code: VALIDATION_FAILED.to_string(),
                message: safe_default_message(op).to_string(),
                details: None,
            }),
            meta: Meta::gateway(&self.gateway),
        }
    }
}

fn check(raw: &Value, service: &str, operation: &str) -> Result<Envelope, Vec<String>> {
    let mut violations = Vec::new();

    let Some(obj) = raw.as_object() else {
        return Err(vec!["response must be an object".to_string()]);
    };
    unknown_keys(obj, ENVELOPE_KEYS, "", &mut violations);

    let status = match obj.get("status").map(|s| s.as_str()) {
        Some(Some("success")) => Some(EnvelopeStatus::Success),
        Some(Some("error")) => Some(EnvelopeStatus::Error),
        Some(_) => {
            violations.push("\"status\" must be one of [success, error]".to_string());
            None
        }
        None => {
            violations.push("\"status\" is required".to_string());
            None
        }
    };

    let result = match obj.get("result") {
        Some(Value::Object(_)) => obj.get("result"),
        Some(_) => {
            violations.push("\"result\" must be of type object".to_string());
            None
        }
        None => {
            if status == Some(EnvelopeStatus::Success) {
                violations.push("\"result\" is required".to_string());
            }
            None
        }
    };

    let error_body = match obj.get("error") {
        Some(Value::Object(err)) => check_error(err, &mut violations),
        Some(_) => {
            violations.push("\"error\" must be of type object".to_string());
            None
        }
        None => {
            if status == Some(EnvelopeStatus::Error) {
                violations.push("\"error\" is required".to_string());
            }
            None
        }
    };

    let meta = match obj.get("meta") {
        Some(Value::Object(meta)) => check_meta(meta, &mut violations),
        Some(_) => {
            violations.push("\"meta\" must be of type object".to_string());
            None
        }
        None => {
            violations.push("\"meta\" is required".to_string());
            None
        }
    };

    let (Some(status), Some(meta), true) = (status, meta, violations.is_empty()) else {
        return Err(violations);
    };

    let result = match (status, result) {
        (EnvelopeStatus::Success, Some(result)) => {
            let op = Operation::lookup(service, operation).ok_or_else(|| {
                vec![format!("no result schema registered for {service}/{operation}")]
            })?;
            Some(op.parse(result)?)
        }
        // Results on error envelopes are not forwarded.
        _ => None,
    };

    Ok(Envelope {
        status,
        result,
        error: error_body,
        meta,
    })
}

fn check_error(err: &Map<String, Value>, violations: &mut Vec<String>) -> Option<ErrorBody> {
    unknown_keys(err, ERROR_KEYS, "error.", violations);
    let code = required_string(err, "code", "error.", violations);
    let message = required_string(err, "message", "error.", violations);
    Some(ErrorBody {
        code: code?,
        message: message?,
        details: err.get("details").cloned(),
    })
}

fn check_meta(meta: &Map<String, Value>, violations: &mut Vec<String>) -> Option<Meta> {
    unknown_keys(meta, META_KEYS, "meta.", violations);
    let service = required_string(meta, "service", "meta.", violations);
    let timestamp = required_string(meta, "timestamp", "meta.", violations);
    if let Some(ts) = &timestamp {
        if !is_iso_date(ts) {
            violations.push("\"meta.timestamp\" must be in ISO 8601 date format".to_string());
        }
    }
    let version = match meta.get("version") {
        None => None,
        Some(Value::String(v)) if !v.is_empty() => Some(v.clone()),
        Some(Value::String(_)) => {
            violations.push("\"meta.version\" is not allowed to be empty".to_string());
            None
        }
        Some(_) => {
            violations.push("\"meta.version\" must be a string".to_string());
            None
        }
    };

    Some(Meta {
        service: service?,
        timestamp: timestamp?,
        version,
    })
}

fn unknown_keys(obj: &Map<String, Value>, allowed: &[&str], prefix: &str, violations: &mut Vec<String>) {
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            violations.push(format!("\"{prefix}{key}\" is not allowed"));
        }
    }
}

fn required_string(
    obj: &Map<String, Value>,
    key: &str,
    prefix: &str,
    violations: &mut Vec<String>,
) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::String(_)) => {
            violations.push(format!("\"{prefix}{key}\" is not allowed to be empty"));
            None
        }
        Some(_) => {
            violations.push(format!("\"{prefix}{key}\" must be a string"));
            None
        }
        None => {
            violations.push(format!("\"{prefix}{key}\" is required"));
            None
        }
    }
}

/// Full RFC 3339, a naive date-time, or a bare date.
fn is_iso_date(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
