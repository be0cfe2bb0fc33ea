//! On-demand health aggregation.
//!
//! # Responsibilities
//! - Probe every configured replica concurrently
//! - Measure this process's resident set against the memory ceiling
//! - Fold per-pool results into one [`HealthSnapshot`]
//!
//! # Design Decisions
//! - Snapshots are computed fresh per invocation, never cached
//! - A probe failure on one endpoint never aborts the others
//! - Aggregation failures degrade the reported status instead of
//!   propagating; `check_health` cannot fail
//! - With multiple pools, the overall status is the worst pool status

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use sysinfo::{Pid, System};
use url::Url;

use crate::config::GatewayConfig;
use crate::health::probe::{HttpProber, Prober};
use crate::health::snapshot::{
    aggregate, BackendHealth, BackendStatus, HealthSnapshot, MemoryUsage, OverallStatus,
};
use crate::observability::metrics;

/// Probes replica pools and the host process, producing aggregated
/// snapshots. Independent of the circuit breaker and retry layers.
pub struct HealthMonitor {
    /// Service name → parsed replica endpoints, pool order preserved.
    pools: Vec<(String, Vec<Url>)>,
    prober: Arc<dyn Prober>,
    memory_limit_bytes: u64,
    started_at: Instant,
}

impl HealthMonitor {
    /// Build a monitor from configuration, probing over HTTP.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let prober = Arc::new(HttpProber::new(
            Duration::from_secs(config.health_check.timeout_secs),
            config.health_check.probe_path.clone(),
        ));
        Self::with_prober(config, prober)
    }

    /// Build a monitor with a custom prober (used by tests with fakes).
    pub fn with_prober(config: &GatewayConfig, prober: Arc<dyn Prober>) -> Self {
        let pools = config
            .services
            .iter()
            .map(|service| {
                let endpoints = service
                    .replicas
                    .iter()
                    .filter_map(|replica| match Url::parse(replica) {
                        Ok(url) => Some(url),
                        Err(e) => {
                            tracing::warn!(replica = %replica, error = %e, "Invalid replica URL");
                            None
                        }
                    })
                    .collect();
                (service.name.clone(), endpoints)
            })
            .collect();

        Self {
            pools,
            prober,
            memory_limit_bytes: config.health_check.memory_limit_mb * 1024 * 1024,
            started_at: Instant::now(),
        }
    }

    /// Compute a fresh snapshot. Never fails; internal errors surface as
    /// an unhealthy snapshot with the `error` field set.
    pub async fn check_health(&self) -> HealthSnapshot {
        let probe_results = self.probe_all().await;

        let mut services = BTreeMap::new();
        for (endpoint, health) in &probe_results {
            metrics::record_backend_health(endpoint, health.status == BackendStatus::Up);
            services.insert(endpoint.clone(), health.clone());
        }

        let uptime = self.started_at.elapsed().as_secs();
        let timestamp = chrono::Utc::now();

        let memory = match read_memory(self.memory_limit_bytes).await {
            Ok(memory) => memory,
            Err(reason) => {
                tracing::error!(error = %reason, "Health aggregation failed");
                return HealthSnapshot {
                    status: OverallStatus::Unhealthy,
                    timestamp,
                    uptime,
                    services,
                    memory: None,
                    error: Some(reason),
                };
            }
        };

        let status = self.worst_pool_status(&probe_results, memory.percentage);

        HealthSnapshot {
            status,
            timestamp,
            uptime,
            services,
            memory: Some(memory),
            error: None,
        }
    }

    /// Probe every distinct endpoint once, concurrently.
    async fn probe_all(&self) -> HashMap<String, BackendHealth> {
        let mut endpoints: Vec<&Url> = Vec::new();
        for (_, pool) in &self.pools {
            for endpoint in pool {
                if !endpoints.iter().any(|e| *e == endpoint) {
                    endpoints.push(endpoint);
                }
            }
        }

        let probes = endpoints.iter().map(|endpoint| async {
            let outcome = self.prober.probe(endpoint).await;
            (endpoint.to_string(), outcome)
        });

        join_all(probes)
            .await
            .into_iter()
            .map(|(endpoint, outcome)| {
                let health = match outcome {
                    Ok(latency) => BackendHealth {
                        status: BackendStatus::Up,
                        response_time: Some(latency.as_millis() as u64),
                    },
                    Err(e) => {
                        tracing::warn!(endpoint = %endpoint, error = %e, "Health probe failed");
                        BackendHealth {
                            status: BackendStatus::Down,
                            response_time: None,
                        }
                    }
                };
                (endpoint, health)
            })
            .collect()
    }

    /// Overall status is healthy only if every pool is healthy.
    fn worst_pool_status(
        &self,
        results: &HashMap<String, BackendHealth>,
        memory_percentage: f64,
    ) -> OverallStatus {
        self.pools
            .iter()
            .map(|(_, pool)| {
                let up = pool
                    .iter()
                    .filter(|endpoint| {
                        results
                            .get(&endpoint.to_string())
                            .map(|h| h.status == BackendStatus::Up)
                            .unwrap_or(false)
                    })
                    .count();
                aggregate(up, pool.len(), memory_percentage)
            })
            .max()
            .unwrap_or(OverallStatus::Unhealthy)
    }
}

/// Read this process's resident set size, reported against `limit_bytes`.
async fn read_memory(limit_bytes: u64) -> Result<MemoryUsage, String> {
    let usage = tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        sys.refresh_all();
        let pid = Pid::from_u32(std::process::id());
        sys.process(pid).map(|p| p.memory())
    })
    .await
    .map_err(|e| format!("memory probe task failed: {e}"))?;

    let rss = usage.ok_or_else(|| "process not found in system table".to_string())?;
    let percentage = ((rss as f64 / limit_bytes as f64) * 100.0).min(100.0);

    Ok(MemoryUsage {
        used: rss / 1024 / 1024,
        total: limit_bytes / 1024 / 1024,
        percentage: (percentage * 100.0).round() / 100.0,
    })
}
