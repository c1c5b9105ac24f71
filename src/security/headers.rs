//! Response hardening headers and CORS.
//!
//! # Responsibilities
//! - Add security response headers the backend did not set
//! - Answer CORS preflights and decorate cross-origin responses
//!
//! # Design Decisions
//! - Headers are inserted only if absent, so backend values pass through untouched
//! - CORS decorates gateway-generated responses; a relayed response keeps the
//!   backend's own `access-control-*` and `vary` values
//! - An empty origin list means any origin

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::map_response;
use axum::response::Response;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::config::CorsConfig;

/// Headers added to every response when enabled.
pub const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Layer the security headers onto a router.
pub fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    SECURITY_HEADERS.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ))
    })
}

/// CORS-related headers a backend set on a relayed response.
///
/// Stored in the response extensions by the forwarder and put back once the
/// CORS layer has run.
#[derive(Debug, Clone, Default)]
pub struct BackendCorsHeaders(HeaderMap);

fn is_access_control(name: &HeaderName) -> bool {
    name.as_str().starts_with("access-control-")
}

impl BackendCorsHeaders {
    pub fn capture(headers: &HeaderMap) -> Self {
        let mut kept = HeaderMap::new();
        for (name, value) in headers {
            if is_access_control(name) || *name == header::VARY {
                kept.append(name.clone(), value.clone());
            }
        }
        Self(kept)
    }

    /// Replace whatever the CORS layer wrote with the backend's values, where it set any.
    fn restore(&self, headers: &mut HeaderMap) {
        if self.0.keys().any(is_access_control) {
            let added: Vec<HeaderName> = headers
                .keys()
                .filter(|name| is_access_control(name))
                .cloned()
                .collect();
            for name in added {
                headers.remove(&name);
            }
        }
        if self.0.contains_key(header::VARY) {
            headers.remove(header::VARY);
        }
        for (name, value) in &self.0 {
            headers.append(name.clone(), value.clone());
        }
    }
}

async fn restore_backend_cors(mut response: Response) -> Response {
    if let Some(backend) = response.extensions_mut().remove::<BackendCorsHeaders>() {
        backend.restore(response.headers_mut());
    }
    response
}

/// Layer CORS onto a router without overriding a backend's own CORS policy.
pub fn with_cors<S>(router: Router<S>, config: &CorsConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(cors_layer(config))
        .layer(map_response(restore_backend_cors))
}

/// Build the CORS layer from configuration.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if config.allowed_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(origins))
}
