//! Response construction.
//!
//! Builders for the gateway's terminal response shapes along with the
//! upstream relay. A handler produces exactly one `Response` value, so
//! a fallback error can never race an already-sent upstream body.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::proxy::UpstreamResponse;
use crate::resilience::CircuitState;

/// 503 emitted when the service's breaker refused the request outright.
pub fn circuit_open() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "Service temporarily unavailable",
            "circuitState": CircuitState::Open.as_str(),
        })),
    )
        .into_response()
}

/// 503 emitted when every replica in the pool was tried and failed.
pub fn all_backends_unavailable(last_error: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "error": "All backend services unavailable",
            "message": last_error,
        })),
    )
        .into_response()
}

/// 404 for paths no route matches.
pub fn endpoint_not_found(method: &str, path: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": format!("Endpoint {method} {path} not found"),
        })),
    )
        .into_response()
}

/// Relay a buffered upstream response verbatim: status, headers, body.
pub fn relay(upstream: UpstreamResponse) -> Response {
    let mut builder = Response::builder().status(upstream.status);
    if let Some(headers) = builder.headers_mut() {
        *headers = upstream.headers;
    }
    builder
        .body(Body::from(upstream.body))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to rebuild upstream response");
            StatusCode::BAD_GATEWAY.into_response()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;

    #[tokio::test]
    async fn relay_preserves_status_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", "application/json".parse().unwrap());

        let response = relay(UpstreamResponse {
            status: StatusCode::CREATED,
            headers,
            body: axum::body::Bytes::from_static(b"{\"id\":1}"),
        });

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"{\"id\":1}");
    }

    #[test]
    fn not_found_message_names_the_endpoint() {
        let response = endpoint_not_found("GET", "/api/unknown");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
