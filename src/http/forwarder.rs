//! Request forwarding to backend services.
//!
//! # Responsibilities
//! - Rewrite the path from the route pattern and bound placeholders
//! - Re-issue the request with the same method, headers and body bytes
//! - Relay the backend status, headers and streamed body unchanged
//! - Classify failures; never build user-facing messages
//!
//! # Design Decisions
//! - The inbound body is buffered once so it can be replayed
//! - The response body is streamed, not buffered
//! - `Host` is set to the backend authority; every other header is copied as-is
//! - The backend's CORS headers ride along in the response extensions so the
//!   gateway's CORS layer cannot replace them
//! - Dropping the forward future (caller disconnect, shutdown abort) drops the backend call

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, Request, Response, Uri};
use http_body_util::LengthLimitError;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::time;

use crate::config::TimeoutConfig;
use crate::routing::{PathParams, Route};
use crate::security::headers::BackendCorsHeaders;
use crate::security::token::Claims;

/// Why a forward attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend did not respond in time")]
    Timeout,

    #[error("could not read request body: {0}")]
    RequestBody(String),

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,
}

impl ForwardError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Unavailable(_) => "unavailable",
            ForwardError::Timeout => "timeout",
            ForwardError::RequestBody(_) => "request_body",
            ForwardError::PayloadTooLarge => "payload_too_large",
        }
    }
}

/// Relays accepted requests to their backend.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    request_timeout: Duration,
    forward_identity: bool,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, forward_identity: bool) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            client,
            request_timeout: Duration::from_secs(timeouts.request_secs),
            forward_identity,
        }
    }

    pub async fn forward(
        &self,
        route: &Route,
        params: &PathParams,
        request: Request<Body>,
        claims: Option<&Claims>,
    ) -> Result<Response<Body>, ForwardError> {
        let (parts, body) = request.into_parts();
        let uri = outbound_uri(route, params, parts.uri.query())?;

        let bytes = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| {
                if exceeds_body_limit(&e) {
                    ForwardError::PayloadTooLarge
                } else {
                    ForwardError::RequestBody(e.to_string())
                }
            })?;

        let mut outbound = Request::new(Body::from(bytes));
        *outbound.method_mut() = parts.method;
        *outbound.headers_mut() = parts.headers;

        if let Some(authority) = uri.authority() {
            if let Ok(host) = HeaderValue::from_str(authority.as_str()) {
                outbound.headers_mut().insert(header::HOST, host);
            }
        }
        if self.forward_identity {
            if let Some(claims) = claims {
                insert_identity(outbound.headers_mut(), claims);
            }
        }
        *outbound.uri_mut() = uri;

        tracing::debug!(
            method = %outbound.method(),
            uri = %outbound.uri(),
            service = %route.service,
            "Forwarding request"
        );

        let response = time::timeout(self.request_timeout, self.client.request(outbound))
            .await
            .map_err(|_| ForwardError::Timeout)?
            .map_err(|e| ForwardError::Unavailable(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let mut response = Response::from_parts(parts, Body::new(body));
        let backend_cors = BackendCorsHeaders::capture(response.headers());
        response.extensions_mut().insert(backend_cors);
        Ok(response)
    }
}

/// `target_base_url` + rendered path + original query, if any.
pub fn outbound_uri(
    route: &Route,
    params: &PathParams,
    query: Option<&str>,
) -> Result<Uri, ForwardError> {
    let mut target = format!("{}{}", route.target_base_url, route.pattern.render(params));
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }

    target
        .parse::<Uri>()
        .map_err(|e| ForwardError::Unavailable(format!("invalid target `{target}`: {e}")))
}

/// True when `err` stems from the body limit layer rather than a broken stream.
fn exceeds_body_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn insert_identity(headers: &mut axum::http::HeaderMap, claims: &Claims) {
    for (name, value) in [
        ("x-user-id", &claims.id),
        ("x-user-email", &claims.email),
        ("x-user-role", &claims.role),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, ServicesConfig};
    use crate::routing::RouteTable;
    use axum::http::Method;

    fn content_table() -> RouteTable {
        let mut services = ServicesConfig::default();
        services.set("content", "http://content.internal:3002/");
        RouteTable::from_config(
            &[RouteConfig::new("GET", "/api/content/{id}", "content", true)],
            &services,
        )
        .unwrap()
    }

    #[test]
    fn rewrites_path_and_keeps_query() {
        let table = content_table();
        let m = table.resolve(&Method::GET, "/api/content/42").unwrap();

        let uri = outbound_uri(m.route, &m.params, Some("x=1")).unwrap();
        assert_eq!(uri.to_string(), "http://content.internal:3002/api/content/42?x=1");

        let bare = outbound_uri(m.route, &m.params, None).unwrap();
        assert_eq!(bare.to_string(), "http://content.internal:3002/api/content/42");
    }

    #[test]
    fn identity_headers_are_added() {
        let mut headers = axum::http::HeaderMap::new();
        let claims = Claims {
            id: "u-1".into(),
            email: "a@b.c".into(),
            role: "editor".into(),
            exp: 0,
            iat: None,
        };
        insert_identity(&mut headers, &claims);
        assert_eq!(headers["x-user-id"], "u-1");
        assert_eq!(headers["x-user-email"], "a@b.c");
        assert_eq!(headers["x-user-role"], "editor");
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        // Bind then drop to get a port with no listener
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut services = ServicesConfig::default();
        services.set("content", format!("http://{addr}"));
        let table = RouteTable::from_config(
            &[RouteConfig::new("GET", "/api/content/{id}", "content", true)],
            &services,
        )
        .unwrap();
        let m = table.resolve(&Method::GET, "/api/content/1").unwrap();

        let forwarder = Forwarder::new(&TimeoutConfig::default(), false);
        let request = Request::builder()
            .uri("/api/content/1")
            .body(Body::empty())
            .unwrap();

        let err = forwarder
            .forward(m.route, &m.params, request, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Unavailable(_)));
    }

    #[tokio::test]
    async fn oversized_streamed_body_is_payload_too_large() {
        let table = content_table();
        let m = table.resolve(&Method::GET, "/api/content/1").unwrap();

        let forwarder = Forwarder::new(&TimeoutConfig::default(), false);
        let limited = http_body_util::Limited::new(Body::from(vec![0u8; 64]), 16);
        let request = Request::builder()
            .uri("/api/content/1")
            .body(Body::new(limited))
            .unwrap();

        let err = forwarder
            .forward(m.route, &m.params, request, None)
            .await
            .unwrap_err();
        assert_eq!(err, ForwardError::PayloadTooLarge);
    }
}
