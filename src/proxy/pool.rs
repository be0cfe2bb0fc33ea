//! Replica pools.
//!
//! An ordered sequence of interchangeable backend endpoints for one
//! logical service. The order is fixed at startup and defines failover
//! priority; pools are never re-ordered or mutated at runtime.

use url::Url;

use crate::config::ServiceConfig;

/// Ordered, immutable backend endpoints for one logical service.
#[derive(Debug, Clone)]
pub struct ReplicaPool {
    service: String,
    replicas: Vec<Url>,
}

impl ReplicaPool {
    /// Build a pool from a service definition, skipping unparseable
    /// endpoints with a warning.
    pub fn from_service(service: &ServiceConfig) -> Self {
        let replicas = service
            .replicas
            .iter()
            .filter_map(|replica| match Url::parse(replica) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(
                        service = %service.name,
                        replica = %replica,
                        error = %e,
                        "Invalid replica URL, excluded from pool"
                    );
                    None
                }
            })
            .collect();

        Self {
            service: service.name.clone(),
            replicas,
        }
    }

    /// Service key this pool belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Endpoints in failover priority order.
    pub fn replicas(&self) -> &[Url] {
        &self.replicas
    }

    /// Number of replicas in the pool.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// True when no usable replica was configured.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}
