//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! /health request
//!     → monitor.rs (fresh snapshot per invocation)
//!     → probe.rs (concurrent per-endpoint probes, fixed timeout)
//!     → snapshot.rs (aggregate into healthy/degraded/unhealthy)
//! ```
//!
//! # Design Decisions
//! - Probes run concurrently and independently; no retries
//! - Probe timeout is independent of (and shorter than) the proxy timeout
//! - No dependency on the resilience layer

pub mod monitor;
pub mod probe;
pub mod snapshot;

pub use monitor::HealthMonitor;
pub use probe::{HttpProber, ProbeError, Prober};
pub use snapshot::{BackendHealth, BackendStatus, HealthSnapshot, MemoryUsage, OverallStatus};
