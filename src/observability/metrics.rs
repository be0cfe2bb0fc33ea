//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, backend
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_backend_health` (gauge): 1=up, 0=down per endpoint
//!
//! # Design Decisions
//! - Low-overhead updates; labels limited to method, status, backend
//! - The Prometheus exporter is optional and bound on its own address

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Failure to bind is logged
/// and the gateway keeps running without exposition.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one proxied request.
pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record a backend's probe result.
pub fn record_backend_health(endpoint: &str, up: bool) {
    metrics::gauge!("gateway_backend_health", "backend" => endpoint.to_string())
        .set(if up { 1.0 } else { 0.0 });
}
