//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every ML service's health endpoint
//! - Keep one [`HealthRecord`] per service
//! - Run the blocking readiness probe at startup
//! - Build degraded envelopes for services known to be down

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::config::schema::{GatewayInfo, HealthCheckConfig, ServiceDescriptor};
use crate::error::{GatewayError, NetworkErrorKind, Result};
use crate::health::state::{HealthRecord, HealthStatus};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::resilience::timeouts::with_timeout;
use crate::validation::Envelope;

/// One health probe against one service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `Ok` only when the service reports itself up.
    async fn probe(&self, service: &ServiceDescriptor) -> Result<()>;
}

/// `GET {base_url}{path}`; only a 200 counts as healthy.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    path: String,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(config: &HealthCheckConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ml-gateway-health-check")
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::Request(e.to_string()))?;
        Ok(Self {
            client,
            path: config.path.clone(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, service: &ServiceDescriptor) -> Result<()> {
        let url = format!("{}{}", service.base_url.trim_end_matches('/'), self.path);
        let timeout = self.timeout;

        with_timeout(timeout, async {
            let response = self
                .client
                .get(&url)
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| GatewayError::from_reqwest(e, timeout))?;

            match response.status().as_u16() {
                200 => Ok(()),
                status => Err(GatewayError::from_status(status)),
            }
        })
        .await
    }
}

/// Result of [`HealthChecker::perform_readiness_probe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub unavailable_services: Vec<String>,
}

/// Point-in-time view of every record.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Utc>,
    pub services: BTreeMap<String, HealthRecord>,
}

struct Shared {
    services: Vec<ServiceDescriptor>,
    records: DashMap<String, HealthRecord>,
    probe: Arc<dyn HealthProbe>,
    config: HealthCheckConfig,
    gateway: GatewayInfo,
}

struct Worker {
    shutdown: Shutdown,
    handle: JoinHandle<()>,
}

/// Background prober with one record per service.
pub struct HealthChecker {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl HealthChecker {
    pub fn new(
        services: Vec<ServiceDescriptor>,
        config: HealthCheckConfig,
        gateway: GatewayInfo,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        let records = DashMap::new();
        for service in &services {
            records.insert(service.name.clone(), HealthRecord::default());
            metrics::record_service_available(&service.name, false);
        }

        Self {
            shared: Arc::new(Shared {
                services,
                records,
                probe,
                config,
                gateway,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Checker probing over HTTP.
    pub fn http(
        services: Vec<ServiceDescriptor>,
        config: HealthCheckConfig,
        gateway: GatewayInfo,
    ) -> Result<Self> {
        let probe = HttpHealthProbe::new(&config)?;
        Ok(Self::new(services, config, gateway, Arc::new(probe)))
    }

    /// Start periodic checks. The first sweep runs immediately.
    ///
    /// Calling this while the worker is running is a no-op. With periodic
    /// checks disabled nothing would ever update availability, so every
    /// service is marked available instead.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            tracing::info!("Health checker already running");
            return;
        }
        if !self.shared.config.enabled {
            tracing::warn!("Periodic health checks disabled, treating every service as available");
            self.shared.assume_all_available();
            return;
        }

        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let shared = Arc::clone(&self.shared);

        tracing::info!(
            interval = shared.config.interval_secs,
            path = %shared.config.path,
            services = shared.services.len(),
            "Health checker starting"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(shared.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = rx.recv() => {
                        tracing::info!("Health checker received shutdown signal, exiting loop");
                        break;
                    }
                    _ = async {
                        ticker.tick().await;
                        shared.check_all().await;
                    } => {}
                }
            }
        });

        *worker = Some(Worker { shutdown, handle });
    }

    /// Stop periodic checks and wait for the worker to exit.
    pub async fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(worker) = worker {
            worker.shutdown.trigger();
            if let Err(e) = worker.handle.await {
                if !e.is_cancelled() {
                    tracing::error!(error = %e, "Health checker task failed");
                }
            }
            tracing::info!("Health checker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Probe one service now. `None` if the name is not registered.
    pub async fn check_service(&self, name: &str) -> Option<HealthRecord> {
        let service = self.shared.services.iter().find(|s| s.name == name)?;
        self.shared.check_service(service).await;
        self.record(name)
    }

    /// Probe every service now.
    pub async fn check_all(&self) {
        self.shared.check_all().await;
    }

    /// Probe each service up to `retry_attempts` times, waiting
    /// `attempt * readiness_backoff` between tries.
    pub async fn perform_readiness_probe(&self) -> ReadinessReport {
        let shared = &self.shared;
        let attempts = shared.config.retry_attempts.max(1);

        let results = join_all(shared.services.iter().map(|service| async move {
            for attempt in 1..=attempts {
                if shared.check_service(service).await {
                    return (service.name.clone(), true);
                }
                if attempt < attempts {
                    let wait = shared.config.readiness_backoff() * attempt;
                    tracing::info!(
                        service = %service.name,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "Service not ready, retrying"
                    );
                    time::sleep(wait).await;
                }
            }
            (service.name.clone(), false)
        }))
        .await;

        let unavailable_services: Vec<String> = results
            .into_iter()
            .filter(|(_, available)| !available)
            .map(|(name, _)| name)
            .collect();

        ReadinessReport {
            ready: unavailable_services.is_empty(),
            unavailable_services,
        }
    }

    pub fn is_service_available(&self, name: &str) -> bool {
        self.shared
            .records
            .get(name)
            .is_some_and(|record| record.available)
    }

    pub fn record(&self, name: &str) -> Option<HealthRecord> {
        self.shared.records.get(name).map(|r| r.clone())
    }

    /// `SERVICE_UNAVAILABLE` envelope carrying the last failure reason.
    pub fn degraded_response(&self, name: &str, operation: &str) -> Envelope {
        let reason = self
            .shared
            .records
            .get(name)
            .and_then(|r| r.last_error.clone())
            .unwrap_or_else(|| "Service is currently unavailable".to_string());
        Envelope::degraded(&self.shared.gateway, name, operation, &reason)
    }

    pub fn status(&self) -> HealthReport {
        HealthReport {
            timestamp: Utc::now(),
            services: self
                .shared
                .records
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.shared.services
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        let worker = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            worker.shutdown.trigger();
            worker.handle.abort();
        }
    }
}

impl Shared {
    fn assume_all_available(&self) {
        for mut record in self.records.iter_mut() {
            record.assume_available();
            metrics::record_service_available(record.key(), true);
        }
    }

    async fn check_all(&self) {
        join_all(self.services.iter().map(|s| self.check_service(s))).await;
        self.log_health_status();
    }

    /// Returns whether the service is now available.
    async fn check_service(&self, service: &ServiceDescriptor) -> bool {
        let started = Instant::now();
        let result = self.probe.probe(service).await;
        let elapsed = started.elapsed();
        let now = Utc::now();

        let Some(mut record) = self.records.get_mut(&service.name) else {
            return false;
        };

        match result {
            Ok(()) => {
                if record.status != HealthStatus::Healthy {
                    tracing::info!(
                        service = %service.name,
                        response_time_ms = elapsed.as_millis() as u64,
                        "Service is healthy"
                    );
                }
                record.record_success(now, elapsed);
                drop(record);
                metrics::record_service_available(&service.name, true);
                true
            }
            Err(err) => {
                let reason = failure_reason(&err);
                let failures = record.record_failure(now, reason.clone(), elapsed);
                drop(record);

                tracing::warn!(
                    service = %service.name,
                    consecutive_failures = failures,
                    error = %reason,
                    "Health check failed"
                );
                if failures >= self.config.alert_threshold {
                    tracing::error!(
                        alert = true,
                        service = %service.name,
                        consecutive_failures = failures,
                        "ALERT: service has failed consecutive health checks"
                    );
                }
                metrics::record_service_available(&service.name, false);
                false
            }
        }
    }

    fn log_health_status(&self) {
        let healthy = self.records.iter().filter(|r| r.available).count();
        let unhealthy: Vec<String> = self
            .records
            .iter()
            .filter(|r| !r.available)
            .map(|r| r.key().clone())
            .collect();

        if unhealthy.is_empty() {
            tracing::info!(healthy, total = self.services.len(), "All ML services healthy");
        } else {
            tracing::warn!(
                healthy,
                total = self.services.len(),
                unhealthy = ?unhealthy,
                "Some ML services are unhealthy"
            );
        }
    }
}

fn failure_reason(err: &GatewayError) -> String {
    match err {
        GatewayError::Network {
            kind: NetworkErrorKind::ConnectionRefused,
            ..
        } => "Service unreachable".to_string(),
        GatewayError::Timeout(limit) => format!("Health check timed out after {limit:?}"),
        GatewayError::Server { status } | GatewayError::Client { status } => {
            format!("Unexpected status: HTTP {status}")
        }
        GatewayError::RateLimited => "Unexpected status: HTTP 429".to_string(),
        other => other.to_string(),
    }
}
