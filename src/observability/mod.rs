//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via tracing; request ID flows through all
//!   subsystems as a span/event field
//! - Metrics are cheap atomic updates behind the `metrics` facade
//! - Prometheus exposition is optional and off the request path

pub mod logging;
pub mod metrics;
