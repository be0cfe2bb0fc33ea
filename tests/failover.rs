//! Failover behavior of the gateway core, exercised directly against
//! mock backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, Uri};

use api_gateway::config::{BreakerConfig, GatewayConfig, RetrySettings, ServiceConfig};
use api_gateway::proxy::{Gateway, ProxyError, ProxyRequest};
use api_gateway::resilience::CircuitState;

mod common;

fn config(replicas: Vec<String>, breaker: BreakerConfig) -> GatewayConfig {
    GatewayConfig {
        services: vec![ServiceConfig {
            name: "customers".into(),
            path_prefix: "/api/customers".into(),
            replicas,
            breaker: Some(breaker),
        }],
        retry: RetrySettings {
            max_attempts: 1,
            initial_delay_ms: 10,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
            retryable_errors: Vec::new(),
        },
        ..GatewayConfig::default()
    }
}

fn request() -> ProxyRequest {
    ProxyRequest::new(
        Method::GET,
        Uri::from_static("/api/customers/1"),
        HeaderMap::new(),
        Bytes::new(),
    )
}

#[tokio::test]
async fn failover_returns_first_live_replica_in_order() {
    // A and B refuse connections; C is live and counts its hits.
    let c_addr: SocketAddr = "127.0.0.1:28601".parse().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    common::start_programmable_backend(c_addr, move || {
        let h = h.clone();
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            (200, r#"{"replica":"c"}"#.to_string())
        }
    })
    .await;

    let gateway = Gateway::from_config(&config(
        vec![
            "http://127.0.0.1:28602".into(),
            "http://127.0.0.1:28603".into(),
            format!("http://{c_addr}"),
        ],
        BreakerConfig {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        },
    ));

    let response = gateway.proxy("customers", request()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], br#"{"replica":"c"}"#);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // The success on C reset the consecutive failure count.
    assert_eq!(gateway.breaker("customers").failure_count(), 0);
    assert_eq!(gateway.breaker("customers").state(), CircuitState::Closed);
}

#[tokio::test]
async fn failures_are_attributed_per_replica() {
    let gateway = Gateway::from_config(&config(
        vec![
            "http://127.0.0.1:28611".into(),
            "http://127.0.0.1:28612".into(),
        ],
        BreakerConfig {
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        },
    ));

    match gateway.proxy("customers", request()).await.unwrap_err() {
        ProxyError::Exhausted { tried, last_error, .. } => {
            assert_eq!(tried, 2);
            assert!(last_error.starts_with("Service unavailable:"), "{last_error}");
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }

    // One breaker failure per tried replica.
    assert_eq!(gateway.breaker("customers").failure_count(), 2);
    assert_eq!(gateway.breaker("customers").state(), CircuitState::Closed);
}

#[tokio::test]
async fn non_success_upstream_status_is_relayed_not_failed_over() {
    let a_addr: SocketAddr = "127.0.0.1:28621".parse().unwrap();
    let b_addr: SocketAddr = "127.0.0.1:28622".parse().unwrap();
    common::start_programmable_backend(a_addr, || async {
        (404, r#"{"message":"no such customer"}"#.to_string())
    })
    .await;
    let b_hits = Arc::new(AtomicU32::new(0));
    let h = b_hits.clone();
    common::start_programmable_backend(b_addr, move || {
        let h = h.clone();
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            (200, "{}".to_string())
        }
    })
    .await;

    let gateway = Gateway::from_config(&config(
        vec![format!("http://{a_addr}"), format!("http://{b_addr}")],
        BreakerConfig::default(),
    ));

    let response = gateway.proxy("customers", request()).await.unwrap();
    assert_eq!(response.status, 404);
    assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.breaker("customers").failure_count(), 0);
}

#[tokio::test]
async fn open_circuit_short_circuits_with_zero_forwarding_attempts() {
    // First endpoint is dead; the live endpoint counts its hits.
    let live_addr: SocketAddr = "127.0.0.1:28631".parse().unwrap();
    let hits = Arc::new(AtomicU32::new(0));
    let h = hits.clone();
    common::start_programmable_backend(live_addr, move || {
        let h = h.clone();
        async move {
            h.fetch_add(1, Ordering::SeqCst);
            (200, "{}".to_string())
        }
    })
    .await;

    let gateway = Gateway::from_config(&config(
        vec!["http://127.0.0.1:28632".into(), format!("http://{live_addr}")],
        BreakerConfig {
            failure_threshold: 1,
            reset_timeout_ms: 60_000,
        },
    ));

    // First pass: the dead replica's failure opens the circuit (threshold
    // 1), so the live replica is refused mid-pass without being attempted.
    let err = gateway.proxy("customers", request()).await.unwrap_err();
    assert!(matches!(err, ProxyError::CircuitOpen { .. }));
    assert_eq!(gateway.breaker("customers").state(), CircuitState::Open);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Second pass: open at request start, zero attempts anywhere.
    let err = gateway.proxy("customers", request()).await.unwrap_err();
    assert!(matches!(err, ProxyError::CircuitOpen { .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn circuit_recovers_through_half_open_probes() {
    let addr: SocketAddr = "127.0.0.1:28641".parse().unwrap();
    let gateway = Gateway::from_config(&config(
        vec![format!("http://{addr}")],
        BreakerConfig {
            failure_threshold: 2,
            reset_timeout_ms: 200,
        },
    ));

    // Backend down: two failed passes open the circuit.
    for _ in 0..2 {
        let _ = gateway.proxy("customers", request()).await.unwrap_err();
    }
    assert_eq!(gateway.breaker("customers").state(), CircuitState::Open);

    // Still cooling down: refused outright.
    let err = gateway.proxy("customers", request()).await.unwrap_err();
    assert!(matches!(err, ProxyError::CircuitOpen { .. }));

    // Backend comes back; after the cooldown the next request is a
    // half-open probe, and the second success closes the circuit.
    common::start_mock_backend(addr, r#"{"ok":true}"#).await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    gateway.proxy("customers", request()).await.unwrap();
    assert_eq!(gateway.breaker("customers").state(), CircuitState::HalfOpen);

    gateway.proxy("customers", request()).await.unwrap();
    assert_eq!(gateway.breaker("customers").state(), CircuitState::Closed);
}

#[tokio::test]
async fn retries_within_one_replica_before_failing_over() {
    // The first endpoint always refuses; with 2 attempts the gateway
    // retries it once before moving to the live replica.
    let live_addr: SocketAddr = "127.0.0.1:28651".parse().unwrap();
    common::start_mock_backend(live_addr, r#"{"replica":"live"}"#).await;

    let mut cfg = config(
        vec!["http://127.0.0.1:28652".into(), format!("http://{live_addr}")],
        BreakerConfig::default(),
    );
    cfg.retry.max_attempts = 2;

    let gateway = Gateway::from_config(&cfg);
    let response = gateway.proxy("customers", request()).await.unwrap();
    assert_eq!(response.status, 200);

    // Retrying inside the breaker means the dead replica still counts as
    // a single breaker failure.
    assert_eq!(gateway.breaker("customers").failure_count(), 0);
}
