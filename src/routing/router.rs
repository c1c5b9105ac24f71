//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Look up matching route for request
//! - Return matched route or explicit not-found
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in declaration order; first structural match wins
//! - Duplicate method+shape definitions are rejected at build time
//! - Explicit NotFound rather than silent default

use axum::http::Method;
use thiserror::Error;

use crate::config::{RouteConfig, ServicesConfig};
use crate::routing::matcher::{MethodMatcher, PathParams, PathPattern};

/// Route resolution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no route matches the request")]
    NotFound,
}

/// Errors building the route table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteTableError {
    #[error("route {path}: invalid method `{method}`")]
    InvalidMethod { method: String, path: String },

    #[error("route {method} {path}: unknown service `{service}`")]
    UnknownService {
        method: String,
        path: String,
        service: String,
    },

    #[error("route {method} {path} duplicates {existing}")]
    Duplicate {
        method: String,
        path: String,
        existing: String,
    },
}

/// A compiled route definition.
#[derive(Debug, Clone)]
pub struct Route {
    pub method: MethodMatcher,
    pub pattern: PathPattern,
    pub service: String,
    pub target_base_url: String,
    pub requires_auth: bool,
}

impl Route {
    fn conflicts_with(&self, other: &Route) -> bool {
        let same_method = match (&self.method, &other.method) {
            (MethodMatcher::Any, MethodMatcher::Any) => true,
            (MethodMatcher::Exact(a), MethodMatcher::Exact(b)) => a == b,
            _ => false,
        };
        same_method && self.pattern.same_shape(&other.pattern)
    }
}

/// A resolved route with its placeholder bindings.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub params: PathParams,
}

/// Immutable table of routes.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile route definitions against the configured service base URLs.
    pub fn from_config(
        routes: &[RouteConfig],
        services: &ServicesConfig,
    ) -> Result<Self, RouteTableError> {
        let mut table = Self::default();

        for cfg in routes {
            let method = MethodMatcher::parse(&cfg.method).ok_or_else(|| {
                RouteTableError::InvalidMethod {
                    method: cfg.method.clone(),
                    path: cfg.path.clone(),
                }
            })?;
            let base = services
                .get(&cfg.service)
                .ok_or_else(|| RouteTableError::UnknownService {
                    method: cfg.method.clone(),
                    path: cfg.path.clone(),
                    service: cfg.service.clone(),
                })?;

            table.push(Route {
                method,
                pattern: PathPattern::parse(cfg.path.as_str()),
                service: cfg.service.clone(),
                target_base_url: base.trim_end_matches('/').to_string(),
                requires_auth: cfg.auth,
            })?;
        }

        tracing::debug!(routes = table.routes.len(), "Route table compiled");
        Ok(table)
    }

    fn push(&mut self, route: Route) -> Result<(), RouteTableError> {
        if let Some(existing) = self.routes.iter().find(|r| r.conflicts_with(&route)) {
            return Err(RouteTableError::Duplicate {
                method: route.method.to_string(),
                path: route.pattern.as_str().to_string(),
                existing: format!("{} {}", existing.method, existing.pattern.as_str()),
            });
        }
        self.routes.push(route);
        Ok(())
    }

    /// Resolve a request. Resolution is all-or-nothing over the full path.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>, RouteError> {
        self.routes
            .iter()
            .filter(|route| route.method.matches(method))
            .find_map(|route| {
                route
                    .pattern
                    .matches(path)
                    .map(|params| RouteMatch { route, params })
            })
            .ok_or(RouteError::NotFound)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
