//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router: `/health` plus a catch-all gateway handler
//! - Wire up middleware (request ID, tracing, CORS, body limit, security headers)
//! - Own the visitor sweep for the lifetime of the server
//! - Drain in-flight requests on shutdown, then cut off the stragglers

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::Response,
    routing::get,
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::validation::ValidationError;
use crate::config::GatewayConfig;
use crate::http::dispatcher::{standard_guards, Dispatcher};
use crate::http::forwarder::Forwarder;
use crate::http::health::health;
use crate::http::request::MakeRequestUuidV4;
use crate::lifecycle::InFlightTracker;
use crate::routing::{RouteTable, RouteTableError};
use crate::security::headers::{with_cors, with_security_headers};
use crate::security::rate_limit::VisitorThrottle;
use crate::security::token::TokenValidator;

/// How long aborted requests get to write their 503 before the server task is dropped.
const ABORT_SETTLE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Routes(#[from] RouteTableError),

    #[error(transparent)]
    Auth(#[from] ValidationError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    throttle: Arc<VisitorThrottle>,
    inflight: InFlightTracker,
    sweep_interval: Duration,
    shutdown_grace: Duration,
}

impl HttpServer {
    /// Build every request-path component from a validated configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, ServerError> {
        let routes = RouteTable::from_config(&config.effective_routes(), &config.services)?;
        let validator = TokenValidator::from_config(&config.auth)?;
        let throttle = Arc::new(VisitorThrottle::from_config(&config.rate_limit));
        let inflight = InFlightTracker::new();

        let dispatcher = Dispatcher::new(
            routes,
            standard_guards(Arc::clone(&throttle), validator),
            Forwarder::new(&config.timeouts, config.security.forward_identity_headers),
            inflight.clone(),
            config.rate_limit.trust_forwarded_for,
        );

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
        };

        Ok(Self {
            router: Self::build_router(config, state),
            throttle,
            inflight,
            sweep_interval: Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
            shutdown_grace: Duration::from_secs(config.timeouts.shutdown_grace_secs),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/health", get(health))
            .fallback(gateway_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size));
        let router = with_cors(router, &config.cors);

        let router = if config.security.enable_headers {
            with_security_headers(router)
        } else {
            router
        };

        router
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// The fully layered router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain within the grace period.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        // Fanned out locally so both tasks are subscribed before anything is sent
        let (stop_tx, _) = broadcast::channel::<()>(1);
        let sweeper = Arc::clone(&self.throttle).spawn_sweeper(self.sweep_interval, stop_tx.subscribe());

        let mut stop_accepting = stop_tx.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stop_accepting.recv().await;
                })
                .await
        });

        tokio::select! {
            result = &mut server => {
                sweeper.abort();
                return result.map_err(io::Error::other)?;
            }
            _ = shutdown.recv() => {}
        }
        let _ = stop_tx.send(());

        tracing::info!(
            in_flight = self.inflight.active_count(),
            grace = ?self.shutdown_grace,
            "Shutdown signal received, draining in-flight requests"
        );

        match time::timeout(self.shutdown_grace, &mut server).await {
            Ok(result) => result.map_err(io::Error::other)??,
            Err(_) => {
                tracing::warn!(
                    aborted = self.inflight.active_count(),
                    "Grace period elapsed, aborting in-flight requests"
                );
                self.inflight.abort_all();
                if time::timeout(ABORT_SETTLE, &mut server).await.is_err() {
                    server.abort();
                }
            }
        }

        if let Err(e) = sweeper.await {
            tracing::warn!(error = %e, "Visitor sweep ended abnormally");
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: everything except `/health` goes through the dispatcher.
async fn gateway_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    state.dispatcher.handle(request, peer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ErrorBody;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app(config: &GatewayConfig) -> Router {
        let peer: SocketAddr = "192.0.2.10:5555".parse().unwrap();
        HttpServer::new(config)
            .unwrap()
            .router()
            .layer(MockConnectInfo(peer))
    }

    fn request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_served_locally_with_headers() {
        let res = app(&GatewayConfig::default())
            .oneshot(request("GET", "/health"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");

        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "UP");
        assert_eq!(body["service"], "api-gateway");
    }

    #[tokio::test]
    async fn health_is_never_throttled() {
        let mut config = GatewayConfig::default();
        config.rate_limit.requests = 0;
        let app = app(&config);

        for _ in 0..3 {
            let res = app.clone().oneshot(request("GET", "/health")).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = app.oneshot(request("GET", "/api/content")).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn unknown_path_gets_json_not_found() {
        let res = app(&GatewayConfig::default())
            .oneshot(request("GET", "/nope"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Resource not found");
    }

    #[tokio::test]
    async fn caller_request_id_is_echoed() {
        let mut req = request("GET", "/nope");
        req.headers_mut()
            .insert("x-request-id", "trace-abc".parse().unwrap());

        let res = app(&GatewayConfig::default()).oneshot(req).await.unwrap();
        assert_eq!(res.headers()["x-request-id"], "trace-abc");
    }

    #[tokio::test]
    async fn security_headers_can_be_disabled() {
        let mut config = GatewayConfig::default();
        config.security.enable_headers = false;

        let res = app(&config).oneshot(request("GET", "/health")).await.unwrap();
        assert!(res.headers().get("x-frame-options").is_none());
    }

    #[tokio::test]
    async fn oversized_streamed_body_is_payload_too_large() {
        let mut config = GatewayConfig::default();
        config.listener.max_body_size = 16;

        let chunks = (0..3).map(|_| Ok::<_, std::io::Error>(vec![0u8; 12]));
        let req = Request::builder()
            .method("POST")
            .uri("/api/users/login")
            .body(Body::from_stream(futures_util::stream::iter(chunks)))
            .unwrap();

        let res = app(&config).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Request body too large");
    }

    #[test]
    fn unknown_route_service_fails_construction() {
        let mut config = GatewayConfig::default();
        config.routes = vec![crate::config::RouteConfig::new("GET", "/x", "billing", false)];
        assert!(matches!(HttpServer::new(&config), Err(ServerError::Routes(_))));
    }
}
