//! Failover proxy core.
//!
//! Composes the resilience layer around outbound forwarding: for one
//! logical service, attempt replicas in pool order, each wrapped as
//! breaker(retry(forward)). The first upstream response wins, whatever
//! its status code; only transport-level failures count against the
//! breaker and trigger failover.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::uri::{Authority, Scheme};
use axum::http::{HeaderMap, HeaderValue, Method, Request, StatusCode, Uri};
use dashmap::DashMap;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::proxy::pool::ReplicaPool;
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryPolicy};

/// Headers that must not be relayed once the body has been buffered.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// An inbound request reduced to what forwarding needs. The body is
/// buffered up front so every attempt can replay it.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Original URI; its path and query are preserved verbatim.
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Assemble a proxy request from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
        }
    }
}

/// A buffered upstream response, relayed verbatim to the caller.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Terminal outcome of a failover pass. Callers distinguish "circuit
/// open" (no attempts possible) from exhaustion (attempts all failed)
/// for alerting.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("no service '{service}' is configured")]
    UnknownService { service: String },

    /// The service's breaker refused the request before any forwarding.
    #[error("Circuit breaker is OPEN")]
    CircuitOpen { service: String },

    /// Every replica in the pool was tried and failed.
    #[error("All backend services unavailable: {last_error}")]
    Exhausted {
        service: String,
        tried: usize,
        last_error: String,
    },
}

/// Request router: owns the replica pools, the per-service breaker
/// registry, and the shared outbound client. One instance per gateway
/// process; no ambient globals.
pub struct Gateway {
    pools: HashMap<String, ReplicaPool>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_defaults: CircuitBreakerConfig,
    breaker_overrides: HashMap<String, CircuitBreakerConfig>,
    retry: RetryPolicy,
    client: Client<HttpConnector, Body>,
    forward_timeout: Duration,
    max_body_bytes: usize,
}

impl Gateway {
    /// Build a gateway from validated configuration.
    pub fn from_config(config: &GatewayConfig) -> Self {
        let pools = config
            .services
            .iter()
            .map(|s| (s.name.clone(), ReplicaPool::from_service(s)))
            .collect();

        let breaker_overrides = config
            .services
            .iter()
            .filter_map(|s| s.breaker.map(|b| (s.name.clone(), b.to_breaker_config())))
            .collect();

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            pools,
            breakers: DashMap::new(),
            breaker_defaults: config.breaker.to_breaker_config(),
            breaker_overrides,
            retry: RetryPolicy::new(config.retry.to_retry_config()),
            client,
            forward_timeout: Duration::from_millis(config.proxy.forward_timeout_ms),
            max_body_bytes: config.proxy.max_body_bytes,
        }
    }

    /// The breaker for `service`, created lazily on first use and kept
    /// for the process lifetime. First writer wins under concurrency.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                let config = self
                    .breaker_overrides
                    .get(service)
                    .copied()
                    .unwrap_or(self.breaker_defaults);
                Arc::new(CircuitBreaker::new(service, config))
            })
            .clone()
    }

    /// The replica pool configured for `service`, if any.
    pub fn pool(&self, service: &str) -> Option<&ReplicaPool> {
        self.pools.get(service)
    }

    /// Forward `request` to the first replica of `service` that answers.
    ///
    /// Replicas are attempted in pool order; each attempt runs as
    /// breaker(retry(forward)). An upstream response of any status code
    /// is a success and ends the pass. If the breaker is open before
    /// the first attempt the pass aborts with zero forwards.
    pub async fn proxy(
        &self,
        service: &str,
        request: ProxyRequest,
    ) -> Result<UpstreamResponse, ProxyError> {
        let pool = self.pool(service).ok_or_else(|| ProxyError::UnknownService {
            service: service.to_string(),
        })?;
        let breaker = self.breaker(service);

        let mut tried = 0usize;
        let mut last_error: Option<GatewayError> = None;

        for endpoint in pool.replicas() {
            // An open circuit fails the whole pass before any endpoint is
            // attempted; once attempts have started, a breaker that opens
            // mid-pass just burns the remaining endpoints as tried.
            if tried == 0 && breaker.is_open() {
                tracing::warn!(service = %service, "circuit open, refusing request");
                return Err(ProxyError::CircuitOpen {
                    service: service.to_string(),
                });
            }

            let outcome = breaker
                .execute(|| async {
                    let retried = self
                        .retry
                        .execute(|| self.forward(endpoint, &request))
                        .await;
                    for record in &retried.attempts {
                        tracing::warn!(
                            service = %service,
                            endpoint = %endpoint,
                            attempt = record.attempt,
                            backoff_ms = record.backoff.as_millis() as u64,
                            error = %record.error,
                            "Retrying forwarding attempt"
                        );
                    }
                    retried.result
                })
                .await;

            match outcome {
                Ok(response) => {
                    tracing::debug!(
                        service = %service,
                        endpoint = %endpoint,
                        status = %response.status,
                        "Upstream responded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(
                        service = %service,
                        endpoint = %endpoint,
                        error = %e,
                        "Backend attempt failed, trying next replica"
                    );
                    tried += 1;
                    last_error = Some(e);
                }
            }
        }

        // A breaker that opened mid-pass reports as circuit-open, not
        // exhaustion, so alerting can tell the cases apart.
        if matches!(last_error, Some(GatewayError::CircuitOpen { .. })) {
            return Err(ProxyError::CircuitOpen {
                service: service.to_string(),
            });
        }

        Err(ProxyError::Exhausted {
            service: service.to_string(),
            tried,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no replicas configured".to_string()),
        })
    }

    /// One forwarding attempt: rewrite the destination authority to the
    /// candidate endpoint, preserve method/path/query/headers/body, and
    /// apply the fixed per-attempt timeout.
    async fn forward(
        &self,
        endpoint: &Url,
        request: &ProxyRequest,
    ) -> Result<UpstreamResponse, GatewayError> {
        let authority =
            Authority::from_str(endpoint.authority()).map_err(GatewayError::upstream)?;

        let mut uri_parts = request.uri.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(authority.clone());
        let uri = Uri::from_parts(uri_parts).map_err(GatewayError::upstream)?;

        let mut outbound = Request::builder().method(request.method.clone()).uri(uri);
        if let Some(headers) = outbound.headers_mut() {
            for (name, value) in request.headers.iter() {
                if name != "host" {
                    headers.insert(name.clone(), value.clone());
                }
            }
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                headers.insert("host", host);
            }
        }
        let outbound = outbound
            .body(Body::from(request.body.clone()))
            .map_err(GatewayError::upstream)?;

        let response =
            match tokio::time::timeout(self.forward_timeout, self.client.request(outbound)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(GatewayError::upstream(e)),
                Err(_) => {
                    return Err(GatewayError::upstream(format!(
                        "timeout of {}ms exceeded",
                        self.forward_timeout.as_millis()
                    )))
                }
            };

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_body_bytes)
            .await
            .map_err(GatewayError::upstream)?;

        let mut headers = parts.headers;
        for name in HOP_BY_HOP_HEADERS {
            headers.remove(*name);
        }

        Ok(UpstreamResponse {
            status: parts.status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn request() -> ProxyRequest {
        ProxyRequest::new(
            Method::GET,
            Uri::from_static("/api/customers/1"),
            HeaderMap::new(),
            Bytes::new(),
        )
    }

    #[tokio::test]
    async fn unknown_service_is_rejected() {
        let gateway = Gateway::from_config(&GatewayConfig::default());
        let err = gateway.proxy("nope", request()).await.unwrap_err();
        assert!(matches!(err, ProxyError::UnknownService { .. }));
    }

    #[tokio::test]
    async fn empty_pool_exhausts_with_zero_tried() {
        let config = GatewayConfig {
            services: vec![ServiceConfig {
                name: "customers".into(),
                path_prefix: "/api/customers".into(),
                replicas: vec![],
                breaker: None,
            }],
            ..GatewayConfig::default()
        };
        let gateway = Gateway::from_config(&config);

        match gateway.proxy("customers", request()).await.unwrap_err() {
            ProxyError::Exhausted { tried, .. } => assert_eq!(tried, 0),
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn breaker_registry_is_per_service_and_stable() {
        let config = GatewayConfig {
            services: vec![
                ServiceConfig {
                    name: "customers".into(),
                    path_prefix: "/api/customers".into(),
                    replicas: vec!["http://b:3000".into()],
                    breaker: None,
                },
                ServiceConfig {
                    name: "orders".into(),
                    path_prefix: "/api/orders".into(),
                    replicas: vec!["http://b:3000".into()],
                    breaker: Some(crate::config::BreakerConfig {
                        failure_threshold: 2,
                        reset_timeout_ms: 1_000,
                    }),
                },
            ],
            ..GatewayConfig::default()
        };
        let gateway = Gateway::from_config(&config);

        let first = gateway.breaker("customers");
        let again = gateway.breaker("customers");
        assert!(Arc::ptr_eq(&first, &again));

        let other = gateway.breaker("orders");
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(other.service(), "orders");
    }
}
