//! Request-to-service routing.
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Path prefix matching only, no regex in the hot path
//! - Longest prefix wins, so `/api/orders/items` beats `/api/orders`
//! - Explicit no-match rather than silent default

use crate::config::ServiceConfig;

/// One compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Service key used for pool and breaker lookup.
    pub service: String,

    /// Path prefix this route matches.
    pub prefix: String,
}

/// Immutable prefix-ordered route table.
#[derive(Debug)]
pub struct RouteTable {
    /// Sorted by prefix length descending so the first match is longest.
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile a table from service definitions.
    pub fn from_services(services: &[ServiceConfig]) -> Self {
        let mut routes: Vec<Route> = services
            .iter()
            .map(|s| Route {
                service: s.name.clone(),
                prefix: s.path_prefix.clone(),
            })
            .collect();
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    /// Resolve a request path to a route, longest prefix first.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| path.starts_with(&r.prefix))
    }
}
