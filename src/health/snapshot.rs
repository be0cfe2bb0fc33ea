//! Aggregated health snapshot types.
//!
//! Serializes to the wire shape served by `/health`:
//!
//! ```json
//! { "status": "healthy",
//!   "timestamp": "2024-01-01T00:00:00Z",
//!   "uptime": 120,
//!   "services": { "http://b1:3000": { "status": "up", "responseTime": 12 } },
//!   "memory": { "used": 84, "total": 512, "percentage": 16.4 } }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Aggregated gateway status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Per-backend probe classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Up,
    Down,
}

/// One replica's probe outcome.
#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub status: BackendStatus,

    /// Probe latency in milliseconds; absent when the probe failed.
    #[serde(rename = "responseTime", skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
}

/// Process memory usage relative to the configured ceiling, in MB.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryUsage {
    pub used: u64,
    pub total: u64,
    pub percentage: f64,
}

/// Point-in-time aggregated view of dependency and process health.
/// Recomputed fresh on every health-check invocation, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: OverallStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub services: BTreeMap<String, BackendHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregation rule for one replica pool against shared memory pressure:
/// healthy iff every backend is up and memory is below 80%, degraded iff
/// at least one backend is up and memory is below 90%, else unhealthy.
pub fn aggregate(up: usize, total: usize, memory_percentage: f64) -> OverallStatus {
    const MEMORY_THRESHOLD_HEALTHY: f64 = 80.0;
    const MEMORY_THRESHOLD_DEGRADED: f64 = 90.0;

    if up == total && total > 0 && memory_percentage < MEMORY_THRESHOLD_HEALTHY {
        OverallStatus::Healthy
    } else if up > 0 && memory_percentage < MEMORY_THRESHOLD_DEGRADED {
        OverallStatus::Degraded
    } else {
        OverallStatus::Unhealthy
    }
}
