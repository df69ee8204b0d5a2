//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the ML gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Identity of this gateway (reported in gateway-built envelopes).
    pub gateway: GatewayInfo,

    /// Downstream ML services.
    pub services: Vec<ServiceConfig>,

    /// Circuit breaker thresholds, shared by every service.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy applied to every outbound inference call.
    pub retries: RetryConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin status surface.
    pub admin: AdminConfig,
}

impl GatewayConfig {
    /// Look up a service by name.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }
}

/// Gateway identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayInfo {
    /// Name written into `meta.service` of degraded and safe-default envelopes.
    pub name: String,

    /// Optional version written into `meta.version`.
    pub version: Option<String>,
}

impl Default for GatewayInfo {
    fn default() -> Self {
        Self {
            name: "api-gateway".to_string(),
            version: None,
        }
    }
}

/// A downstream ML service descriptor.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Unique service identifier (e.g. "identity").
    pub name: String,

    /// Base URL; `/health` and task paths are joined onto it.
    pub base_url: String,

    /// Value sent in the `x-api-key` header.
    #[serde(default)]
    pub api_key: String,

    /// Whether the gateway may start without this service.
    #[serde(default)]
    pub required: bool,
}

impl ServiceConfig {
    pub fn new(name: &str, base_url: &str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.to_string(),
            api_key: String::new(),
            required,
        }
    }
}

/// Descriptors are static once loaded; the schema type doubles as the
/// runtime descriptor.
pub type ServiceDescriptor = ServiceConfig;

/// Default service set: complaint is feature-gating, identity and the app
/// crawler are required.
pub fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("complaint", "http://localhost:5000", false),
        ServiceConfig::new("identity", "http://localhost:5001", true),
        ServiceConfig::new("appCrawler", "http://localhost:5002", true),
    ]
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window before opening.
    pub failure_threshold: u32,

    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,

    /// Cooldown before an open circuit admits a trial call, in milliseconds.
    pub timeout_ms: u64,

    /// Sliding window for counting failures, in milliseconds.
    pub monitoring_period_ms: u64,
}

impl CircuitBreakerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout_ms: 60_000,
            monitoring_period_ms: 10_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt (total attempts = max_retries + 1).
    pub max_retries: u32,

    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound on the un-jittered delay, in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,

    /// Jitter added on top of each delay, as a fraction of it.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_ratio: 0.3,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic background checks. When off, every service is
    /// treated as available.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Health check timeout in seconds.
    pub timeout_secs: u64,

    /// Path probed on every service.
    pub path: String,

    /// Attempts per service during the startup readiness probe.
    pub retry_attempts: u32,

    /// Readiness backoff unit; attempt `n` waits `n * readiness_backoff_ms`.
    pub readiness_backoff_ms: u64,

    /// Consecutive failures before an alert-level log line.
    pub alert_threshold: u32,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn readiness_backoff(&self) -> Duration {
        Duration::from_millis(self.readiness_backoff_ms)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
            path: "/health".to_string(),
            retry_attempts: 3,
            readiness_backoff_ms: 1_000,
            alert_threshold: 5,
        }
    }
}

/// Timeout configuration for outbound inference calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-attempt deadline for task endpoints, in seconds.
    pub inference_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,
}

impl TimeoutConfig {
    pub fn inference(&self) -> Duration {
        Duration::from_secs(self.inference_secs)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inference_secs: 30,
            connect_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// JSON for production, pretty for development.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin status surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve `/health` and `/status`.
    pub enabled: bool,

    /// Admin bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
