//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use edge_gateway::config::GatewayConfig;
use edge_gateway::http::HttpServer;
use edge_gateway::lifecycle::Shutdown;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_SECRET: &str = "integration-test-secret";

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path plus query string.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What a mock backend answers.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub headers: Vec<(&'static str, &'static str)>,
    pub body: String,
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        self.headers.push((name, value));
        self
    }
}

type ReplyFuture = Pin<Box<dyn Future<Output = MockReply> + Send>>;
type Responder = Arc<dyn Fn(RecordedRequest) -> ReplyFuture + Send + Sync>;

#[derive(Clone)]
struct BackendState {
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
    responder: Responder,
}

/// A running mock backend on an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<RecordedRequest> {
        self.seen.lock().unwrap().last().cloned()
    }
}

async fn record_and_reply(State(state): State<BackendState>, request: Request<Body>) -> Response<Body> {
    let (parts, body) = request.into_parts();
    let recorded = RecordedRequest {
        method: parts.method,
        uri: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body: axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default(),
    };
    state.seen.lock().unwrap().push(recorded.clone());

    let reply = (state.responder)(recorded).await;
    let mut builder = Response::builder().status(StatusCode::from_u16(reply.status).unwrap());
    for (name, value) in reply.headers {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(reply.body)).unwrap()
}

/// Start a programmable mock backend with async support.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MockReply> + Send + 'static,
{
    let seen = Arc::new(Mutex::new(Vec::new()));
    let state = BackendState {
        seen: Arc::clone(&seen),
        responder: Arc::new(move |req| -> ReplyFuture { Box::pin(f(req)) }),
    };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(record_and_reply).with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    MockBackend { addr, seen }
}

/// Start a mock backend that always returns 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> MockBackend {
    start_programmable_backend(move |_| async move { MockReply::ok(body) }).await
}

/// Start a mock backend that answers 200 after `delay`.
pub async fn start_slow_backend(delay: Duration) -> MockBackend {
    start_programmable_backend(move |_| async move {
        tokio::time::sleep(delay).await;
        MockReply::ok("slow")
    })
    .await
}

/// Defaults with every service pointed at `backend` and a test secret.
pub fn config_for(backend: &MockBackend) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for service in ["user", "content", "recommendation"] {
        config.services.set(service, backend.url());
    }
    config.auth.jwt_secret = TEST_SECRET.to_string();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config
}

/// A gateway serving on an ephemeral port.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<io::Result<()>>,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let server = HttpServer::new(&config).expect("gateway config should be valid");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    RunningGateway {
        addr,
        shutdown,
        handle,
    }
}

/// HS256 token signed with `secret`, expiring `exp_offset_secs` from now.
pub fn mint_token(secret: &str, exp_offset_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = serde_json::json!({
        "id": "user-42",
        "email": "ada@example.com",
        "role": "user",
        "iat": now,
        "exp": now + exp_offset_secs,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub fn valid_token() -> String {
    mint_token(TEST_SECRET, 3600)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
