//! Error taxonomy for the gateway core.
//!
//! Two layers of failure exist:
//! - [`GatewayError`]: a single attempt against one backend. Transient
//!   upstream failures are retryable; a refused call from an open circuit
//!   is not.
//! - `ProxyError` (in `proxy::gateway`): the terminal outcome of a whole
//!   failover pass, surfaced to the HTTP layer as a 503-class response.

use thiserror::Error;

/// Failure of a single guarded call to a backend.
#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    /// Network-level failure (timeout, connection refused, reset) while
    /// forwarding to an upstream. These are the errors the retry policy
    /// reacts to; a non-2xx upstream status is NOT an error.
    #[error("Service unavailable: {message}")]
    Upstream {
        /// Underlying transport error, as text.
        message: String,
    },

    /// The circuit breaker refused the call without invoking it.
    /// Never retried; the failover loop treats it as a tried endpoint.
    #[error("Circuit breaker is OPEN")]
    CircuitOpen {
        /// Logical service the breaker guards.
        service: String,
    },
}

impl GatewayError {
    /// Wrap a transport-level error as a transient upstream failure.
    pub fn upstream(err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            message: err.to_string(),
        }
    }

    /// True for failures the retry policy may act on at all.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Upstream { .. })
    }
}
