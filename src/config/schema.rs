//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files, and
//! every section carries defaults so a minimal (or absent) config still
//! yields a runnable gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use crate::resilience::retry::RetryConfig;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Logical services, each with an ordered replica pool.
    pub services: Vec<ServiceConfig>,

    /// Circuit breaker policy shared by all services unless overridden.
    pub breaker: BreakerConfig,

    /// Retry policy for forwarding attempts.
    pub retry: RetrySettings,

    /// Health probe settings for the `/health` endpoint.
    pub health_check: HealthCheckConfig,

    /// Proxy forwarding settings (per-attempt timeout, body limits).
    pub proxy: ProxySettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Apply environment overrides, mirroring the deployment contract:
    /// `PORT` overrides the listener port and `BACKEND_SERVICE_1..3`
    /// supply the replica pool when no services are configured.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                let host = self
                    .listener
                    .bind_address
                    .rsplit_once(':')
                    .map(|(h, _)| h.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.listener.bind_address = format!("{host}:{port}");
            }
        }

        if self.services.is_empty() {
            let replicas = default_replicas_from_env();
            self.services = vec![
                ServiceConfig {
                    name: "customers".to_string(),
                    path_prefix: "/api/customers".to_string(),
                    replicas: replicas.clone(),
                    breaker: None,
                },
                ServiceConfig {
                    name: "products".to_string(),
                    path_prefix: "/api/products".to_string(),
                    replicas,
                    breaker: None,
                },
            ];
        }

        self
    }

    /// Every distinct replica endpoint across all services, in first-seen
    /// order. Used by the health monitor and the info endpoint.
    pub fn all_replicas(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for service in &self.services {
            for replica in &service.replicas {
                if !seen.contains(replica) {
                    seen.push(replica.clone());
                }
            }
        }
        seen
    }
}

fn default_replicas_from_env() -> Vec<String> {
    [
        ("BACKEND_SERVICE_1", "http://customer-service-1:3000"),
        ("BACKEND_SERVICE_2", "http://customer-service-2:3000"),
        ("BACKEND_SERVICE_3", "http://customer-service-3:3000"),
    ]
    .iter()
    .map(|(var, fallback)| std::env::var(var).unwrap_or_else(|_| fallback.to_string()))
    .collect()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// A logical service and its ordered replica pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Service key, used for the breaker registry and logging.
    pub name: String,

    /// Request path prefix routed to this service.
    pub path_prefix: String,

    /// Ordered backend endpoints; order defines failover priority.
    pub replicas: Vec<String>,

    /// Optional per-service breaker override; absent means the
    /// gateway-wide `[breaker]` section applies.
    #[serde(default)]
    pub breaker: Option<BreakerConfig>,
}

/// Circuit breaker policy.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Cooldown before an open circuit allows a half-open probe, in ms.
    pub reset_timeout_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        }
    }
}

impl BreakerConfig {
    /// Convert to the resilience-layer config type.
    pub fn to_breaker_config(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
        }
    }
}

/// Retry policy settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts per endpoint (1 = no retries).
    pub max_attempts: u32,

    /// Delay before the first retry, in ms.
    pub initial_delay_ms: u64,

    /// Upper bound on any backoff delay, in ms.
    pub max_delay_ms: u64,

    /// Multiplicative backoff growth factor.
    pub backoff_multiplier: f64,

    /// Substring patterns (case-insensitive) an error message must
    /// contain to be retried. Empty means every transient error is
    /// retryable.
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            initial_delay_ms: 500,
            max_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetrySettings {
    /// Convert to the resilience-layer config type.
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            retryable_errors: self.retryable_errors.clone(),
        }
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Probe timeout in seconds. Independent of the proxy timeout;
    /// health probes never retry.
    pub timeout_secs: u64,

    /// Path probed on each replica.
    pub probe_path: String,

    /// Memory ceiling the resident-set size is reported against, in MB.
    pub memory_limit_mb: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            probe_path: "/api".to_string(),
            memory_limit_mb: 512,
        }
    }
}

/// Proxy forwarding settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Fixed timeout for each forwarding attempt, in ms.
    pub forward_timeout_ms: u64,

    /// Maximum buffered request/response body size in bytes.
    pub max_body_bytes: usize,

    /// Overall inbound request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            forward_timeout_ms: 2_000,
            max_body_bytes: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment_contract() {
        let config = GatewayConfig::default();
        assert_eq!(config.breaker.failure_threshold, 5);
        assert_eq!(config.breaker.reset_timeout_ms, 60_000);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_delay_ms, 500);
        assert_eq!(config.health_check.probe_path, "/api");
        assert_eq!(config.health_check.memory_limit_mb, 512);
        assert_eq!(config.proxy.forward_timeout_ms, 2_000);
    }

    #[test]
    fn minimal_toml_parses_with_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[services]]
            name = "customers"
            path_prefix = "/api/customers"
            replicas = ["http://127.0.0.1:3001", "http://127.0.0.1:3002"]
            "#,
        )
        .unwrap();

        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].replicas.len(), 2);
        assert!(config.services[0].breaker.is_none());
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn per_service_breaker_override_parses() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [[services]]
            name = "orders"
            path_prefix = "/api/orders"
            replicas = ["http://127.0.0.1:3001"]
            breaker = { failure_threshold = 2, reset_timeout_ms = 5000 }
            "#,
        )
        .unwrap();

        let breaker = config.services[0].breaker.unwrap();
        assert_eq!(breaker.failure_threshold, 2);
        assert_eq!(breaker.reset_timeout_ms, 5_000);
    }

    #[test]
    fn all_replicas_deduplicates_across_services() {
        let config = GatewayConfig {
            services: vec![
                ServiceConfig {
                    name: "a".into(),
                    path_prefix: "/a".into(),
                    replicas: vec!["http://x:1".into(), "http://y:1".into()],
                    breaker: None,
                },
                ServiceConfig {
                    name: "b".into(),
                    path_prefix: "/b".into(),
                    replicas: vec!["http://y:1".into(), "http://z:1".into()],
                    breaker: None,
                },
            ],
            ..GatewayConfig::default()
        };

        assert_eq!(
            config.all_replicas(),
            vec!["http://x:1", "http://y:1", "http://z:1"]
        );
    }
}
