//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; replica pools never change at runtime
//! - All fields have defaults to allow minimal configs
//! - Environment variables (PORT, BACKEND_SERVICE_*) fill gaps, matching
//!   the container deployment contract
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BreakerConfig, GatewayConfig, HealthCheckConfig, ListenerConfig, ObservabilityConfig,
    ProxySettings, RetrySettings, ServiceConfig,
};
