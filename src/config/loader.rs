//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{default_services, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    Env { key: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate configuration.
///
/// Without a file the built-in defaults (including the default service set)
/// are used.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    let config = apply_env_overrides(config)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply overrides from `std::env`.
pub fn apply_env_overrides(config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Apply overrides from an arbitrary key lookup.
///
/// Service keys are `ML_<SERVICE>_URL`, `ML_<SERVICE>_API_KEY` and
/// `ML_<SERVICE>_REQUIRED`, with `ML_SERVICE_API_KEY` as the shared key for
/// services that have none.
pub fn apply_overrides<F>(mut config: GatewayConfig, lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if config.services.is_empty() {
        config.services = default_services();
    }

    let shared_key = lookup("ML_SERVICE_API_KEY");
    for service in &mut config.services {
        let prefix = format!("ML_{}", env_name(&service.name));

        if let Some(url) = lookup(&format!("{prefix}_URL")) {
            service.base_url = url;
        }
        if let Some(key) = lookup(&format!("{prefix}_API_KEY")) {
            service.api_key = key;
        } else if service.api_key.is_empty() {
            if let Some(key) = &shared_key {
                service.api_key = key.clone();
            }
        }
        override_parsed(&lookup, &format!("{prefix}_REQUIRED"), &mut service.required)?;
    }

    let cb = &mut config.circuit_breaker;
    override_parsed(&lookup, "GATEWAY_CB_FAILURE_THRESHOLD", &mut cb.failure_threshold)?;
    override_parsed(&lookup, "GATEWAY_CB_SUCCESS_THRESHOLD", &mut cb.success_threshold)?;
    override_parsed(&lookup, "GATEWAY_CB_TIMEOUT_MS", &mut cb.timeout_ms)?;
    override_parsed(&lookup, "GATEWAY_CB_MONITORING_PERIOD_MS", &mut cb.monitoring_period_ms)?;

    let retry = &mut config.retries;
    override_parsed(&lookup, "GATEWAY_RETRY_MAX_RETRIES", &mut retry.max_retries)?;
    override_parsed(&lookup, "GATEWAY_RETRY_INITIAL_DELAY_MS", &mut retry.initial_delay_ms)?;
    override_parsed(&lookup, "GATEWAY_RETRY_MAX_DELAY_MS", &mut retry.max_delay_ms)?;
    override_parsed(&lookup, "GATEWAY_RETRY_BACKOFF_MULTIPLIER", &mut retry.backoff_multiplier)?;

    let health = &mut config.health_check;
    override_parsed(&lookup, "GATEWAY_HEALTH_INTERVAL_SECS", &mut health.interval_secs)?;
    override_parsed(&lookup, "GATEWAY_HEALTH_TIMEOUT_SECS", &mut health.timeout_secs)?;
    override_parsed(&lookup, "GATEWAY_HEALTH_RETRY_ATTEMPTS", &mut health.retry_attempts)?;

    if let Some(level) = lookup("GATEWAY_LOG_LEVEL") {
        config.observability.log_level = level;
    }

    Ok(config)
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(key) {
        *target = value.trim().parse().map_err(|_| ConfigError::Env {
            key: key.to_string(),
            value,
        })?;
    }
    Ok(())
}

/// `appCrawler` -> `APP_CRAWLER`.
fn env_name(service: &str) -> String {
    let mut out = String::with_capacity(service.len() + 4);
    let mut prev_lower = false;
    for ch in service.chars() {
        if ch.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        if ch == '-' {
            out.push('_');
        } else {
            out.push(ch.to_ascii_uppercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("appCrawler"), "APP_CRAWLER");
        assert_eq!(env_name("identity"), "IDENTITY");
        assert_eq!(env_name("fraud-score"), "FRAUD_SCORE");
    }

    #[test]
    fn test_service_overrides() {
        let lookup = lookup_from(&[
            ("ML_APP_CRAWLER_URL", "http://crawler:9000"),
            ("ML_IDENTITY_API_KEY", "id-key"),
            ("ML_SERVICE_API_KEY", "shared"),
            ("ML_COMPLAINT_REQUIRED", "true"),
        ]);
        let config = apply_overrides(GatewayConfig::default(), lookup).unwrap();

        let crawler = config.service("appCrawler").unwrap();
        assert_eq!(crawler.base_url, "http://crawler:9000");
        assert_eq!(crawler.api_key, "shared");

        assert_eq!(config.service("identity").unwrap().api_key, "id-key");
        assert!(config.service("complaint").unwrap().required);
    }

    #[test]
    fn test_policy_overrides() {
        let lookup = lookup_from(&[
            ("GATEWAY_CB_FAILURE_THRESHOLD", "3"),
            ("GATEWAY_RETRY_MAX_RETRIES", "1"),
            ("GATEWAY_HEALTH_INTERVAL_SECS", "10"),
            ("GATEWAY_LOG_LEVEL", "debug"),
        ]);
        let config = apply_overrides(GatewayConfig::default(), lookup).unwrap();

        assert_eq!(config.circuit_breaker.failure_threshold, 3);
        assert_eq!(config.retries.max_retries, 1);
        assert_eq!(config.health_check.interval_secs, 10);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_bad_env_value() {
        let lookup = lookup_from(&[("GATEWAY_CB_TIMEOUT_MS", "soon")]);
        let err = apply_overrides(GatewayConfig::default(), lookup).unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref key, .. } if key == "GATEWAY_CB_TIMEOUT_MS"));
    }
}
