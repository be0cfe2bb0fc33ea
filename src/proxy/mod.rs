//! Proxying subsystem.
//!
//! # Data Flow
//! ```text
//! Matched request (service key, buffered body)
//!     → gateway.rs (failover loop)
//!     → resilience: breaker(retry(forward))
//!     → pool.rs endpoints in fixed priority order
//!     → first upstream response relayed verbatim
//! ```
//!
//! # Design Decisions
//! - Fixed-order failover only; no load balancing policies
//! - Non-2xx upstream statuses are relayed, never treated as failures
//! - Body buffered once, replayed across attempts and replicas

pub mod gateway;
pub mod pool;

pub use gateway::{Gateway, ProxyError, ProxyRequest, UpstreamResponse};
pub use pool::ReplicaPool;
