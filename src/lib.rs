//! API gateway resilience core.
//!
//! A gateway process that proxies requests for logical services across
//! ordered replica pools with graceful degradation:
//!
//! - **Circuit breaking**: one breaker per logical service stops calling
//!   a failing pool for a cooldown, then probes recovery (half-open).
//! - **Bounded retry**: per-attempt exponential backoff, capped, no
//!   jitter, gated by a retryability predicate.
//! - **Fixed-order failover**: replicas are tried in configured order;
//!   the first upstream response of any status wins.
//! - **Aggregated health**: `/health` probes every replica concurrently
//!   and reports healthy/degraded/unhealthy alongside process memory.
//!
//! Each gateway process owns its own breaker state; nothing is shared or
//! persisted across instances or restarts.

// Core subsystems
pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod routing;

// Traffic management
pub mod health;
pub mod resilience;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::{load_config, GatewayConfig};
pub use error::GatewayError;
pub use health::{HealthMonitor, HealthSnapshot};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{Gateway, ProxyError, ProxyRequest};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
