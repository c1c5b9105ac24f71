//! Per-request pipeline.
//!
//! # Data Flow
//! ```text
//! Received
//!     → RateLimitGuard   → RateChecked
//!     → AuthGuard        → AuthChecked
//!     → route lookup     → Routed
//!     → Forwarder        → Forwarded
//!     → access log       → Completed
//! any failure            → Rejected
//! ```
//!
//! # Design Decisions
//! - Guards are an explicit ordered list; the first failure short-circuits
//! - The route is looked up once up front so the auth guard knows whether the
//!   route is public, but a miss is only acted on after every guard passed
//! - On an unknown path a present `Authorization` header is still verified, so
//!   a bad token is refused before the caller learns the path does not exist

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, request::Parts, Request};
use axum::response::{IntoResponse, Response};

use crate::error::Rejection;
use crate::http::forwarder::Forwarder;
use crate::http::request::request_id;
use crate::lifecycle::InFlightTracker;
use crate::observability::metrics;
use crate::routing::RouteTable;
use crate::security::rate_limit::{client_id, VisitorThrottle};
use crate::security::token::{AuthError, Claims, TokenValidator};

/// Where a request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    RateChecked,
    AuthChecked,
    Routed,
    Forwarded,
    Completed,
    Rejected,
}

/// Whether the resolved route wants a bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    Required,
    Public,
    /// No route matched; the request will end in not-found.
    Unrouted,
}

/// Transient state for one request. Dropped when the response is sent.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_id: String,
    pub auth: AuthRequirement,
    pub claims: Option<Claims>,
    pub state: DispatchState,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            client_id: client_id.into(),
            auth: AuthRequirement::Unrouted,
            claims: None,
            state: DispatchState::Received,
        }
    }
}

/// One admission stage. Runs before any backend call.
pub trait Guard: Send + Sync {
    /// State reached once this guard passes.
    fn stage(&self) -> DispatchState;

    fn check(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), Rejection>;
}

/// Per-client token bucket.
pub struct RateLimitGuard {
    throttle: Arc<VisitorThrottle>,
}

impl RateLimitGuard {
    pub fn new(throttle: Arc<VisitorThrottle>) -> Self {
        Self { throttle }
    }
}

impl Guard for RateLimitGuard {
    fn stage(&self) -> DispatchState {
        DispatchState::RateChecked
    }

    fn check(&self, _parts: &Parts, ctx: &mut RequestContext) -> Result<(), Rejection> {
        self.throttle.check(&ctx.client_id)?;
        Ok(())
    }
}

/// Bearer token verification for protected routes.
pub struct AuthGuard {
    validator: TokenValidator,
}

impl AuthGuard {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }

    fn verify(&self, parts: &Parts) -> Result<Claims, AuthError> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .map(|v| v.to_str().map_err(|_| AuthError::Malformed))
            .transpose()?;
        self.validator.validate(header)
    }
}

impl Guard for AuthGuard {
    fn stage(&self) -> DispatchState {
        DispatchState::AuthChecked
    }

    fn check(&self, parts: &Parts, ctx: &mut RequestContext) -> Result<(), Rejection> {
        match ctx.auth {
            AuthRequirement::Public => {}
            AuthRequirement::Required => ctx.claims = Some(self.verify(parts)?),
            AuthRequirement::Unrouted => {
                if parts.headers.contains_key(header::AUTHORIZATION) {
                    ctx.claims = Some(self.verify(parts)?);
                }
            }
        }
        Ok(())
    }
}

/// The standard guard order: throttle first, then authentication.
pub fn standard_guards(
    throttle: Arc<VisitorThrottle>,
    validator: TokenValidator,
) -> Vec<Box<dyn Guard>> {
    vec![
        Box::new(RateLimitGuard::new(throttle)),
        Box::new(AuthGuard::new(validator)),
    ]
}

/// Runs every inbound request through the guards and forwards survivors.
pub struct Dispatcher {
    routes: RouteTable,
    guards: Vec<Box<dyn Guard>>,
    forwarder: Forwarder,
    inflight: InFlightTracker,
    trust_forwarded_for: bool,
}

impl Dispatcher {
    pub fn new(
        routes: RouteTable,
        guards: Vec<Box<dyn Guard>>,
        forwarder: Forwarder,
        inflight: InFlightTracker,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            routes,
            guards,
            forwarder,
            inflight,
            trust_forwarded_for,
        }
    }

    /// Drive one request through the pipeline. `ctx.state` records how far it got.
    pub async fn dispatch(
        &self,
        request: Request<Body>,
        ctx: &mut RequestContext,
    ) -> Result<Response, Rejection> {
        let (parts, body) = request.into_parts();

        let resolved = self.routes.resolve(&parts.method, parts.uri.path());
        ctx.auth = match &resolved {
            Ok(m) if m.route.requires_auth => AuthRequirement::Required,
            Ok(_) => AuthRequirement::Public,
            Err(_) => AuthRequirement::Unrouted,
        };

        for guard in &self.guards {
            guard.check(&parts, ctx)?;
            ctx.state = guard.stage();
        }

        let matched = resolved?;
        ctx.state = DispatchState::Routed;

        let route = matched.route;
        let response = self
            .forwarder
            .forward(
                route,
                &matched.params,
                Request::from_parts(parts, body),
                ctx.claims.as_ref(),
            )
            .await
            .inspect_err(|e| metrics::record_upstream_error(&route.service, e.kind()))?;
        ctx.state = DispatchState::Forwarded;

        Ok(response.into_response())
    }

    /// Entry point from the HTTP layer. Never fails; rejections become responses.
    pub async fn handle(&self, request: Request<Body>, peer: SocketAddr) -> Response {
        let start = Instant::now();
        let _inflight = self.inflight.track();

        let method = request.method().clone();
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());
        let mut ctx = RequestContext::new(
            request_id(request.headers()),
            client_id(request.headers(), peer, self.trust_forwarded_for),
        );

        let result = tokio::select! {
            result = self.dispatch(request, &mut ctx) => result,
            _ = self.inflight.aborted() => Err(Rejection::ShuttingDown),
        };

        let (response, outcome) = match result {
            Ok(response) => {
                ctx.state = DispatchState::Completed;
                (response, "forwarded")
            }
            Err(rejection) => {
                ctx.state = DispatchState::Rejected;
                let reason = rejection.reason();
                metrics::record_rejection(reason);
                match &rejection {
                    Rejection::Upstream(e) => tracing::warn!(
                        request_id = %ctx.request_id,
                        error = %e,
                        "Upstream request failed"
                    ),
                    other => tracing::debug!(
                        request_id = %ctx.request_id,
                        client = %ctx.client_id,
                        error = %other,
                        "Request rejected"
                    ),
                }
                (rejection.into_response(), reason)
            }
        };

        let status = response.status();
        metrics::record_request(method.as_str(), status.as_u16(), outcome, start);
        tracing::info!(
            request_id = %ctx.request_id,
            method = %method,
            path = %path,
            client = %peer,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, ServicesConfig, TimeoutConfig};
    use crate::security::token::tests::{mint, SECRET};
    use axum::http::StatusCode;
    use jsonwebtoken::Algorithm;
    use std::time::Duration;

    /// Address with nothing listening on it.
    fn closed_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    fn dispatcher_for(backend: SocketAddr, requests: u32) -> Dispatcher {
        let mut services = ServicesConfig::default();
        services.set("content", format!("http://{backend}"));
        let routes = RouteTable::from_config(
            &[
                RouteConfig::new("GET", "/api/content/public", "content", false),
                RouteConfig::new("GET", "/api/content/{id}", "content", true),
            ],
            &services,
        )
        .unwrap();

        let throttle = Arc::new(VisitorThrottle::new(requests, Duration::from_secs(60)));
        Dispatcher::new(
            routes,
            standard_guards(throttle, TokenValidator::new(SECRET, Algorithm::HS256)),
            Forwarder::new(&TimeoutConfig::default(), false),
            InFlightTracker::new(),
            false,
        )
    }

    fn get(path: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn throttle_runs_before_auth() {
        let dispatcher = dispatcher_for(closed_addr(), 0);
        let mut ctx = RequestContext::new("r", "c");

        let err = dispatcher
            .dispatch(get("/api/content/1", Some("garbage")), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::RateLimited(_)));
        assert_eq!(ctx.state, DispatchState::Received);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthorized() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let mut ctx = RequestContext::new("r", "c");

        let err = dispatcher
            .dispatch(get("/api/content/1", None), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Unauthorized(AuthError::Missing)));
        assert_eq!(ctx.auth, AuthRequirement::Required);
        assert_eq!(ctx.state, DispatchState::RateChecked);
        assert!(ctx.claims.is_none());
    }

    #[tokio::test]
    async fn bad_token_on_unknown_path_is_unauthorized() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let mut ctx = RequestContext::new("r", "c");

        let err = dispatcher
            .dispatch(get("/api/nothing-here", Some("garbage")), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Unauthorized(_)));
        assert_eq!(ctx.auth, AuthRequirement::Unrouted);
    }

    #[tokio::test]
    async fn unknown_path_without_token_is_not_found() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let mut ctx = RequestContext::new("r", "c");

        let err = dispatcher
            .dispatch(get("/api/nothing-here", None), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::NotFound(_)));
        assert_eq!(ctx.state, DispatchState::AuthChecked);
    }

    #[tokio::test]
    async fn valid_token_reaches_forwarding() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let mut ctx = RequestContext::new("r", "c");
        let token = mint(SECRET, Algorithm::HS256, 3600);

        let err = dispatcher
            .dispatch(get("/api/content/1", Some(&token)), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Upstream(_)));
        assert_eq!(ctx.state, DispatchState::Routed);
        assert_eq!(ctx.claims.as_ref().map(|c| c.id.as_str()), Some("user-1"));
    }

    #[tokio::test]
    async fn public_route_skips_auth() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let mut ctx = RequestContext::new("r", "c");

        let err = dispatcher
            .dispatch(get("/api/content/public", Some("garbage")), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Rejection::Upstream(_)));
        assert_eq!(ctx.auth, AuthRequirement::Public);
    }

    #[tokio::test]
    async fn handle_maps_rejections_to_responses() {
        let dispatcher = dispatcher_for(closed_addr(), 10);
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();

        let response = dispatcher.handle(get("/api/content/1", None), peer).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = dispatcher.handle(get("/api/content/public", None), peer).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(dispatcher.inflight.active_count(), 0);
    }

    #[tokio::test]
    async fn abort_cuts_off_a_hanging_forward() {
        // Accepts connections (via the backlog) but never answers
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dispatcher = Arc::new(dispatcher_for(silent.local_addr().unwrap(), 10));
        let peer: SocketAddr = "192.0.2.1:4000".parse().unwrap();

        let task = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle(get("/api/content/public", None), peer).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatcher.inflight.active_count(), 1);
        dispatcher.inflight.abort_all();

        let response = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("abort should end the request")
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(dispatcher.inflight.active_count(), 0);
        drop(silent);
    }
}
