//! HTTP server setup and request dispatch.
//!
//! # Responsibilities
//! - Create the Axum router with the info, health, and proxy handlers
//! - Wire up middleware (tracing, overall request timeout)
//! - Inject/propagate request IDs
//! - Dispatch matched requests into the failover gateway
//! - Serve with graceful shutdown

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::health::{HealthMonitor, OverallStatus};
use crate::http::response;
use crate::observability::metrics;
use crate::proxy::{Gateway, ProxyError, ProxyRequest};
use crate::routing::RouteTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    gateway: Arc<Gateway>,
    routes: Arc<RouteTable>,
    health: Arc<HealthMonitor>,
    backends: Arc<Vec<String>>,
    max_body_bytes: usize,
}

/// HTTP server for the API gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server from validated configuration.
    pub fn new(config: GatewayConfig) -> Self {
        let state = AppState {
            gateway: Arc::new(Gateway::from_config(&config)),
            routes: Arc::new(RouteTable::from_services(&config.services)),
            health: Arc::new(HealthMonitor::from_config(&config)),
            backends: Arc::new(config.all_replicas()),
            max_body_bytes: config.proxy.max_body_bytes,
        };

        let router = Router::new()
            .route("/", get(index_handler))
            .route("/health", get(health_handler))
            .fallback(proxy_handler)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.proxy.request_timeout_secs,
                    ))),
            );

        Self { router }
    }

    /// Serve until the shutdown signal fires, then drain gracefully.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Gateway info endpoint.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "message": "API Gateway",
        "backendServices": *state.backends,
    }))
}

/// Aggregated health endpoint. Degraded still serves 200 so orchestrators
/// keep routing traffic; only unhealthy turns the readiness check red.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.check_health().await;
    let status_code = match snapshot.status {
        OverallStatus::Healthy | OverallStatus::Degraded => StatusCode::OK,
        OverallStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(snapshot))
}

/// Main proxy handler: match route, buffer body, run the failover pass.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let method_str = method.to_string();
    let path = request.uri().path().to_string();

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let route = match state.routes.resolve(&path) {
        Some(route) => route.clone(),
        None => {
            tracing::debug!(request_id = %request_id, method = %method, path = %path, "No route matched");
            metrics::record_request(&method_str, 404, "none", start);
            return response::endpoint_not_found(&method_str, &path);
        }
    };

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %path,
        service = %route.service,
        "Proxying request"
    );

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to buffer request body");
            metrics::record_request(&method_str, 413, &route.service, start);
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut headers = parts.headers;
    if let Ok(id) = request_id.parse() {
        headers.insert("x-request-id", id);
    }

    let proxy_request = ProxyRequest::new(method, parts.uri, headers, body);

    match state.gateway.proxy(&route.service, proxy_request).await {
        Ok(upstream) => {
            metrics::record_request(&method_str, upstream.status.as_u16(), &route.service, start);
            response::relay(upstream)
        }
        Err(ProxyError::CircuitOpen { service }) => {
            tracing::warn!(request_id = %request_id, service = %service, "Rejected by open circuit");
            metrics::record_request(&method_str, 503, &service, start);
            response::circuit_open()
        }
        Err(ProxyError::Exhausted {
            service,
            tried,
            last_error,
        }) => {
            tracing::error!(
                request_id = %request_id,
                service = %service,
                tried = tried,
                last_error = %last_error,
                "All backends unavailable"
            );
            metrics::record_request(&method_str, 503, &service, start);
            response::all_backends_unavailable(&last_error)
        }
        Err(ProxyError::UnknownService { .. }) => {
            metrics::record_request(&method_str, 404, "none", start);
            response::endpoint_not_found(&method_str, &path)
        }
    }
}
