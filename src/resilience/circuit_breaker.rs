//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: first call after reset_timeout elapses
//! Half-Open → Closed: two consecutive successes
//! Half-Open → Open: any single failure
//! ```
//!
//! # Design Decisions
//! - One breaker per logical service, shared by all requests to it
//! - Fail fast in Open state: the guarded operation is never invoked
//! - Transitions happen in a single critical section; the lock is not
//!   held across the awaited operation

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::GatewayError;

/// Consecutive successes required to close a half-open circuit.
const HALF_OPEN_SUCCESS_THRESHOLD: u32 = 2;

/// Externally observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    #[serde(rename = "CLOSED")]
    Closed,
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "HALF_OPEN")]
    HalfOpen,
}

impl CircuitState {
    /// Wire representation, matching the failure response shape.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Circuit breaker policy.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Cooldown an open circuit waits before allowing a half-open probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Set the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Set the reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure: None,
        }
    }

    /// True once the cooldown has elapsed since the last recorded failure.
    /// Trivially true when no failure was ever recorded.
    fn reset_elapsed(&self, reset_timeout: Duration) -> bool {
        self.last_failure
            .map_or(true, |at| at.elapsed() >= reset_timeout)
    }
}

/// Per-service failure counter and state machine.
///
/// Shared across all requests to one logical service; every transition
/// rule runs under the inner mutex so concurrent requests observe a
/// serialized view of the counters.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named service.
    pub fn new(service: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            service: service.into(),
            config,
            inner: Mutex::new(BreakerInner::new()),
        }
    }

    /// Service key this breaker guards.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Current raw state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failure count since the last reset.
    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// True while the circuit is open AND the reset timeout has not yet
    /// elapsed. Once cooled down this returns false so callers proceed
    /// into [`execute`](Self::execute), which performs the half-open
    /// transition.
    pub fn is_open(&self) -> bool {
        let inner = self.lock();
        inner.state == CircuitState::Open && !inner.reset_elapsed(self.config.reset_timeout)
    }

    /// Forcibly return to Closed with all counters zeroed.
    /// Administrative operation, not used on the normal path.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = BreakerInner::new();
        tracing::info!(service = %self.service, "circuit breaker reset");
    }

    /// Run `operation` under the breaker.
    ///
    /// When the circuit is open and still cooling down, the operation is
    /// never invoked and the call fails with [`GatewayError::CircuitOpen`].
    /// Otherwise the operation runs and its outcome drives the state
    /// machine; its error is returned to the caller unchanged.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        self.before_call()?;

        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Gate a call: refuse while open and cooling down, or transition to
    /// half-open when the cooldown has elapsed.
    fn before_call(&self) -> Result<(), GatewayError> {
        let mut inner = self.lock();

        if inner.state == CircuitState::Open {
            if inner.reset_elapsed(self.config.reset_timeout) {
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 0;
                tracing::info!(service = %self.service, "circuit half-open, probing backend");
            } else {
                return Err(GatewayError::CircuitOpen {
                    service: self.service.clone(),
                });
            }
        }

        Ok(())
    }

    fn record_success(&self) {
        let mut inner = self.lock();
        inner.failure_count = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.success_count += 1;
            if inner.success_count >= HALF_OPEN_SUCCESS_THRESHOLD {
                inner.state = CircuitState::Closed;
                inner.success_count = 0;
                tracing::info!(service = %self.service, "circuit closed after recovery");
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(service = %self.service, "probe failed, circuit reopened");
            }
            CircuitState::Closed if inner.failure_count >= self.config.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    service = %self.service,
                    failures = inner.failure_count,
                    "failure threshold reached, circuit opened"
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(threshold: u32, reset_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::default()
                .with_failure_threshold(threshold)
                .with_reset_timeout(reset_timeout),
        )
    }

    async fn fail(b: &CircuitBreaker) -> Result<(), GatewayError> {
        b.execute(|| async { Err::<(), _>(GatewayError::upstream("boom")) })
            .await
    }

    async fn succeed(b: &CircuitBreaker) -> Result<(), GatewayError> {
        b.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn opens_after_exactly_threshold_failures() {
        let b = breaker(5, Duration::from_secs(60));

        for _ in 0..4 {
            let _ = fail(&b).await;
            assert_eq!(b.state(), CircuitState::Closed);
        }
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
        assert_eq!(b.failure_count(), 5);
    }

    #[tokio::test]
    async fn open_circuit_short_circuits_without_invoking_operation() {
        let b = breaker(1, Duration::from_secs(60));
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = b
            .execute(|| async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, GatewayError>(())
            })
            .await;

        assert!(matches!(result, Err(GatewayError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn half_open_closes_after_two_successes() {
        let b = breaker(1, Duration::from_millis(20));
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!b.is_open());

        succeed(&b).await.unwrap();
        // One success is not enough to close the circuit.
        assert_eq!(b.state(), CircuitState::HalfOpen);

        succeed(&b).await.unwrap();
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_reopens_on_single_failure() {
        let b = breaker(3, Duration::from_millis(20));
        for _ in 0..3 {
            let _ = fail(&b).await;
        }
        assert_eq!(b.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);
        assert!(b.is_open());
    }

    #[tokio::test]
    async fn failure_error_is_returned_unchanged() {
        let b = breaker(5, Duration::from_secs(60));
        let err = fail(&b).await.unwrap_err();
        assert_eq!(err.to_string(), "Service unavailable: boom");
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let b = breaker(5, Duration::from_secs(60));
        let _ = fail(&b).await;
        let _ = fail(&b).await;
        assert_eq!(b.failure_count(), 2);

        succeed(&b).await.unwrap();
        assert_eq!(b.failure_count(), 0);
        assert_eq!(b.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn reset_returns_to_closed() {
        let b = breaker(1, Duration::from_secs(60));
        let _ = fail(&b).await;
        assert_eq!(b.state(), CircuitState::Open);

        b.reset();
        assert_eq!(b.state(), CircuitState::Closed);
        assert_eq!(b.failure_count(), 0);
        assert!(!b.is_open());
    }

    #[tokio::test]
    async fn concurrent_failures_do_not_lose_increments() {
        let b = Arc::new(breaker(64, Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let b = b.clone();
            handles.push(tokio::spawn(async move {
                let _ = b
                    .execute(|| async { Err::<(), _>(GatewayError::upstream("x")) })
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(b.failure_count(), 32);
        assert_eq!(b.state(), CircuitState::Closed);
    }
}
