//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, route dispatch, request ID)
//!     → routing decides the service key
//!     → proxy::Gateway runs the failover pass
//!     → response.rs (relay upstream or build failure shape)
//! ```

pub mod response;
pub mod server;

pub use server::HttpServer;
