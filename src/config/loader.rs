//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {name} has invalid value `{value}`")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then process environment overrides, then validation.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the deployment environment variables on top of a config.
///
/// Empty values are ignored, matching how the variables are usually templated.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(port) = get("PORT") {
        let port: u16 = port.parse().map_err(|_| ConfigError::Env {
            name: "PORT",
            value: port.clone(),
        })?;
        config.listener.bind_address = format!("0.0.0.0:{port}");
    }

    if let Some(secret) = get("JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }

    for (var, service) in [
        ("USER_SERVICE_URL", "user"),
        ("CONTENT_SERVICE_URL", "content"),
        ("RECOMMENDATION_SERVICE_URL", "recommendation"),
    ] {
        if let Some(url) = get(var) {
            config.services.set(service, url);
        }
    }

    if let Some(requests) = get("RATE_LIMIT_REQUESTS") {
        config.rate_limit.requests = requests.parse().map_err(|_| ConfigError::Env {
            name: "RATE_LIMIT_REQUESTS",
            value: requests.clone(),
        })?;
    }

    if let Some(window) = get("RATE_LIMIT_WINDOW") {
        config.rate_limit.window_secs = window.parse().map_err(|_| ConfigError::Env {
            name: "RATE_LIMIT_WINDOW",
            value: window.clone(),
        })?;
    }

    Ok(())
}
