//! Semantic configuration checks.
//!
//! Serde handles syntax; this pass catches configurations that parse but
//! cannot run: empty pools, unparseable replica URLs, zero thresholds.

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a parsed configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("service '{service}' has an empty replica pool")]
    EmptyPool { service: String },

    #[error("service '{service}' replica '{replica}' is not a valid http URL: {reason}")]
    InvalidReplica {
        service: String,
        replica: String,
        reason: String,
    },

    #[error("service '{service}' path prefix must start with '/': '{prefix}'")]
    InvalidPrefix { service: String, prefix: String },

    #[error("duplicate service name '{service}'")]
    DuplicateService { service: String },

    #[error("failure_threshold must be at least 1 (service scope: {scope})")]
    ZeroThreshold { scope: String },

    #[error("retry max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("retry backoff_multiplier must be at least 1.0 (got {got})")]
    SubUnitMultiplier { got: f64 },
}

/// Validate a parsed configuration, collecting every problem rather than
/// stopping at the first.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut names: Vec<&str> = Vec::new();
    for service in &config.services {
        if names.contains(&service.name.as_str()) {
            errors.push(ValidationError::DuplicateService {
                service: service.name.clone(),
            });
        }
        names.push(&service.name);

        if service.replicas.is_empty() {
            errors.push(ValidationError::EmptyPool {
                service: service.name.clone(),
            });
        }

        if !service.path_prefix.starts_with('/') {
            errors.push(ValidationError::InvalidPrefix {
                service: service.name.clone(),
                prefix: service.path_prefix.clone(),
            });
        }

        for replica in &service.replicas {
            match Url::parse(replica) {
                Ok(url) if url.scheme() == "http" => {}
                Ok(url) => errors.push(ValidationError::InvalidReplica {
                    service: service.name.clone(),
                    replica: replica.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError::InvalidReplica {
                    service: service.name.clone(),
                    replica: replica.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if let Some(breaker) = &service.breaker {
            if breaker.failure_threshold == 0 {
                errors.push(ValidationError::ZeroThreshold {
                    scope: service.name.clone(),
                });
            }
        }
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::ZeroThreshold {
            scope: "gateway".to_string(),
        });
    }

    if config.retry.max_attempts == 0 {
        errors.push(ValidationError::ZeroAttempts);
    }

    if config.retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::SubUnitMultiplier {
            got: config.retry.backoff_multiplier,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
