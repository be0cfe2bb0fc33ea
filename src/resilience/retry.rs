//! Bounded retry with exponential backoff.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Grow the delay multiplicatively, capped at `max_delay`, no jitter
//! - Consult the retryability predicate before sleeping
//!
//! # Design Decisions
//! - No retry callback: every retried attempt is returned to the caller
//!   as a structured [`AttemptRecord`] and logged there
//! - `CircuitOpen` is never retryable; an empty pattern list means every
//!   transient error is

use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Retry policy parameters. Immutable per gateway instance.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on any backoff delay.
    pub max_delay: Duration,

    /// Multiplicative growth factor applied after each sleep.
    pub backoff_multiplier: f64,

    /// Case-insensitive substrings an error message must contain to be
    /// retried. Empty means all transient errors are retryable.
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
            retryable_errors: Vec::new(),
        }
    }
}

impl RetryConfig {
    /// Set the attempt bound (clamped to at least 1).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the first-retry delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the backoff multiplier (clamped to at least 1.0).
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Restrict retries to errors whose message contains one of `patterns`.
    pub fn with_retryable_errors(mut self, patterns: Vec<String>) -> Self {
        self.retryable_errors = patterns;
        self
    }

    /// Next delay after `current` has been slept: multiplicative growth,
    /// capped at `max_delay`.
    fn next_delay(&self, current: Duration) -> Duration {
        let grown = current.as_secs_f64() * self.backoff_multiplier.max(1.0);
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }
}

/// One failed attempt that was followed by a retry.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    /// 1-based attempt number that failed.
    pub attempt: u32,

    /// Error message of the failed attempt.
    pub error: String,

    /// Backoff slept before the next attempt.
    pub backoff: Duration,
}

/// Result of a retried execution plus the attempts it burned through.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result: the first success, or the last error.
    pub result: Result<T, GatewayError>,

    /// One record per failed attempt that was retried. The terminal
    /// failure (or a non-retryable one) is only in `result`.
    pub attempts: Vec<AttemptRecord>,
}

/// Bounded-attempt executor.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy from config.
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Policy parameters.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// True if the error is eligible for a retry under this policy.
    pub fn is_retryable(&self, error: &GatewayError) -> bool {
        if !error.is_transient() {
            return false;
        }
        if self.config.retryable_errors.is_empty() {
            return true;
        }
        let message = error.to_string().to_lowercase();
        self.config
            .retryable_errors
            .iter()
            .any(|pattern| message.contains(&pattern.to_lowercase()))
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// The first attempt runs immediately. A failure on the last allowed
    /// attempt, or a non-retryable failure, ends the run with no further
    /// sleep. Otherwise the policy sleeps for the current backoff, grows
    /// it, and tries again.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.initial_delay;
        let mut attempts = Vec::new();

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(err) => {
                    if attempt == max_attempts || !self.is_retryable(&err) {
                        return RetryOutcome {
                            result: Err(err),
                            attempts,
                        };
                    }

                    attempts.push(AttemptRecord {
                        attempt,
                        error: err.to_string(),
                        backoff: delay,
                    });
                    tokio::time::sleep(delay).await;
                    delay = self.config.next_delay(delay);
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        unreachable!("retry loop exited without a result")
    }
}
