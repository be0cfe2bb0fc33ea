//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend replica:
//!     → circuit_breaker.rs (refuse fast while the service is failing)
//!     → retry.rs (bounded attempts with capped exponential backoff)
//!     → outbound forward (proxy::gateway)
//! ```
//!
//! # Design Decisions
//! - Retry runs INSIDE the breaker: one breaker outcome per endpoint,
//!   regardless of how many retry attempts it absorbed
//! - Backoff is strictly multiplicative and capped, no jitter
//! - Breaker state is per logical service, not per replica

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{AttemptRecord, RetryConfig, RetryOutcome, RetryPolicy};
