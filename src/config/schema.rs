//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder secret shipped in the defaults. Startup warns when it is still in use.
pub const DEFAULT_JWT_SECRET: &str = "your-secret-key-change-in-production";

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Backend service base URLs, keyed by service name.
    pub services: ServicesConfig,

    /// Bearer token verification settings.
    pub auth: AuthConfig,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Response hardening and forwarding options.
    pub security: SecurityConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Route definitions. Empty means the built-in table.
    pub routes: Vec<RouteConfig>,
}

impl GatewayConfig {
    /// Routes in effect: the configured list, or the built-in table when none are given.
    pub fn effective_routes(&self) -> Vec<RouteConfig> {
        if self.routes.is_empty() {
            default_routes()
        } else {
            self.routes.clone()
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Backend base URLs by service name.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ServicesConfig(pub BTreeMap<String, String>);

impl ServicesConfig {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, base_url: impl Into<String>) {
        self.0.insert(name.into(), base_url.into());
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        let mut services = BTreeMap::new();
        services.insert("user".to_string(), "http://user-service:3001".to_string());
        services.insert("content".to_string(), "http://content-service:3002".to_string());
        services.insert(
            "recommendation".to_string(),
            "http://recommendation-engine:8081".to_string(),
        );
        Self(services)
    }
}

/// Bearer token verification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret.
    pub jwt_secret: String,

    /// Expected signing algorithm (HS256, HS384 or HS512).
    pub algorithm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            algorithm: "HS256".to_string(),
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Request quota per window (bucket capacity).
    pub requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// How often idle visitors are swept, in seconds.
    pub sweep_interval_secs: u64,

    /// Key clients by the first `X-Forwarded-For` entry instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 100,
            window_secs: 60,
            sweep_interval_secs: 60,
            trust_forwarded_for: false,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Time allowed for a backend to produce response headers, in seconds.
    pub request_secs: u64,

    /// Grace period for in-flight requests on shutdown, in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Response hardening and forwarding options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add security headers to responses that lack them.
    pub enable_headers: bool,

    /// Send `x-user-id`, `x-user-email` and `x-user-role` to backends for authenticated requests.
    pub forward_identity_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            forward_identity_headers: false,
        }
    }
}

/// Cross-origin configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
}

/// A route mapping a method and path pattern to a backend service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// HTTP method, or `*` for any.
    pub method: String,

    /// Path pattern; `{name}` segments are placeholders.
    pub path: String,

    /// Name of the service in `[services]`.
    pub service: String,

    /// Whether a valid bearer token is required.
    #[serde(default)]
    pub auth: bool,
}

impl RouteConfig {
    pub fn new(method: &str, path: &str, service: &str, auth: bool) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            service: service.to_string(),
            auth,
        }
    }
}

/// The gateway's built-in public surface.
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new("POST", "/api/users/register", "user", false),
        RouteConfig::new("POST", "/api/users/login", "user", false),
        RouteConfig::new("POST", "/api/users/logout", "user", true),
        RouteConfig::new("GET", "/api/users/profile", "user", true),
        RouteConfig::new("PUT", "/api/users/profile", "user", true),
        RouteConfig::new("POST", "/api/users/change-password", "user", true),
        RouteConfig::new("GET", "/api/content", "content", true),
        RouteConfig::new("GET", "/api/content/{id}", "content", true),
        RouteConfig::new("POST", "/api/content", "content", true),
        RouteConfig::new("PUT", "/api/content/{id}", "content", true),
        RouteConfig::new("DELETE", "/api/content/{id}", "content", true),
        RouteConfig::new("GET", "/api/recommendations/{userId}", "recommendation", true),
        RouteConfig::new("POST", "/api/recommendations/interactions", "recommendation", true),
    ]
}
