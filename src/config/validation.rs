//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing services)
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - A zero rate-limit quota or window is legal; the throttle fails closed on it

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::security::token::parse_symmetric_algorithm;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("service `{name}` has invalid base URL `{url}`")]
    ServiceUrl { name: String, url: String },

    #[error("route {method} {path} references unknown service `{service}`")]
    UnknownService {
        method: String,
        path: String,
        service: String,
    },

    #[error("route path `{0}` must start with `/`")]
    RoutePath(String),

    #[error("auth.jwt_secret must not be empty")]
    EmptySecret,

    #[error("auth.algorithm `{0}` is not a symmetric HMAC algorithm")]
    Algorithm(String),

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("rate_limit.sweep_interval_secs must be greater than zero")]
    ZeroSweepInterval,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    for (name, url) in &config.services.0 {
        let valid = Url::parse(url)
            .map(|u| u.scheme() == "http" && u.has_host())
            .unwrap_or(false);
        if !valid {
            errors.push(ValidationError::ServiceUrl {
                name: name.clone(),
                url: url.clone(),
            });
        }
    }

    for route in config.effective_routes() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::RoutePath(route.path.clone()));
        }
        if config.services.get(&route.service).is_none() {
            errors.push(ValidationError::UnknownService {
                method: route.method.clone(),
                path: route.path.clone(),
                service: route.service.clone(),
            });
        }
    }

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::EmptySecret);
    }
    if parse_symmetric_algorithm(&config.auth.algorithm).is_none() {
        errors.push(ValidationError::Algorithm(config.auth.algorithm.clone()));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }
    if config.rate_limit.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
