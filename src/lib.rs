//! Edge API gateway library.
//!
//! Authenticates callers, throttles abusive clients and forwards accepted
//! requests unchanged to the backend service that owns the route.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::GatewayConfig;
pub use error::Rejection;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
