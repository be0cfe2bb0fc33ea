//! Backend probing.
//!
//! The monitor talks to replicas through the [`Prober`] capability so
//! tests can substitute fakes; production uses [`HttpProber`] backed by
//! the same hyper client stack the proxy uses, with its own shorter
//! timeout. Health probes never retry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time;
use url::Url;

/// Why a probe classified an endpoint as down.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("non-success status {0}")]
    Status(u16),

    #[error("invalid probe request: {0}")]
    BadRequest(String),
}

/// Capability for checking a single replica endpoint.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `endpoint`, returning the observed latency when it is up.
    async fn probe(&self, endpoint: &Url) -> Result<Duration, ProbeError>;
}

/// Production prober issuing `GET {endpoint}{probe_path}` over HTTP.
pub struct HttpProber {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
    probe_path: String,
}

impl HttpProber {
    /// Create a prober with the given fixed timeout and probe path.
    pub fn new(timeout: Duration, probe_path: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            timeout,
            probe_path: probe_path.into(),
        }
    }

    fn probe_uri(&self, endpoint: &Url) -> String {
        format!(
            "{}{}",
            endpoint.as_str().trim_end_matches('/'),
            self.probe_path
        )
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &Url) -> Result<Duration, ProbeError> {
        let request = Request::builder()
            .method("GET")
            .uri(self.probe_uri(endpoint))
            .header("user-agent", "api-gateway-health-check")
            .body(Body::empty())
            .map_err(|e| ProbeError::BadRequest(e.to_string()))?;

        let started = Instant::now();
        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(started.elapsed()),
            Ok(Ok(response)) => Err(ProbeError::Status(response.status().as_u16())),
            Ok(Err(e)) => Err(ProbeError::Connect(e.to_string())),
            Err(_) => Err(ProbeError::Timeout(self.timeout)),
        }
    }
}
