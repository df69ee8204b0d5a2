//! Per-service shared state, built once at startup.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::schema::{CircuitBreakerConfig, GatewayConfig, GatewayInfo, ServiceDescriptor};
use crate::error::Result;
use crate::health::HealthChecker;
use crate::resilience::{CircuitBreaker, CircuitSnapshot};

/// Service descriptors, one circuit breaker per service name, and the
/// health checker. Passed explicitly to everything that needs them.
pub struct Registry {
    gateway: GatewayInfo,
    descriptors: Vec<ServiceDescriptor>,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    health: Arc<HealthChecker>,
}

impl Registry {
    pub fn new(config: &GatewayConfig, health: Arc<HealthChecker>) -> Self {
        let breakers = DashMap::new();
        for service in &config.services {
            breakers.insert(
                service.name.clone(),
                Arc::new(CircuitBreaker::new(&service.name, config.circuit_breaker.clone())),
            );
        }

        Self {
            gateway: config.gateway.clone(),
            descriptors: config.services.clone(),
            breaker_config: config.circuit_breaker.clone(),
            breakers,
            health,
        }
    }

    /// Registry whose health checker probes over HTTP.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let health = HealthChecker::http(
            config.services.clone(),
            config.health_check.clone(),
            config.gateway.clone(),
        )?;
        Ok(Self::new(config, Arc::new(health)))
    }

    pub fn gateway(&self) -> &GatewayInfo {
        &self.gateway
    }

    pub fn health(&self) -> &Arc<HealthChecker> {
        &self.health
    }

    pub fn descriptors(&self) -> &[ServiceDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// The breaker for `name`, created on first use.
    pub fn breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(name) {
            return Arc::clone(breaker.value());
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(name, self.breaker_config.clone())))
            .value()
            .clone()
    }

    /// Snapshots of every breaker, ordered by service name.
    pub fn circuit_snapshots(&self) -> Vec<CircuitSnapshot> {
        let mut snapshots: Vec<_> = self.breakers.iter().map(|b| b.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_services;

    #[tokio::test]
    async fn test_one_breaker_per_service() {
        let config = GatewayConfig {
            services: default_services(),
            ..Default::default()
        };
        let registry = Registry::from_config(&config).unwrap();

        let a = registry.breaker("identity");
        let b = registry.breaker("identity");
        assert!(Arc::ptr_eq(&a, &b));

        let names: Vec<_> = registry
            .circuit_snapshots()
            .into_iter()
            .map(|s| s.service)
            .collect();
        assert_eq!(names, vec!["appCrawler", "complaint", "identity"]);

        assert!(registry.descriptor("appCrawler").unwrap().required);
        assert!(registry.descriptor("missing").is_none());
    }
}
