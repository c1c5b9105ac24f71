//! Request-level rejections and their HTTP mapping.
//!
//! Every early exit from the dispatcher is a [`Rejection`]. The mapping to a
//! status code and public message lives here and nowhere else; component
//! errors only classify what went wrong.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::forwarder::ForwardError;
use crate::http::response::error_response;
use crate::routing::RouteError;
use crate::security::rate_limit::RateLimitError;
use crate::security::token::AuthError;

#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error(transparent)]
    NotFound(#[from] RouteError),

    #[error(transparent)]
    Upstream(#[from] ForwardError),

    #[error("gateway is shutting down")]
    ShuttingDown,
}

impl Rejection {
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Rejection::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Rejection::NotFound(_) => StatusCode::NOT_FOUND,
            Rejection::Upstream(ForwardError::RequestBody(_)) => StatusCode::BAD_REQUEST,
            Rejection::Upstream(ForwardError::PayloadTooLarge) => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::Upstream(_) => StatusCode::BAD_GATEWAY,
            Rejection::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::RateLimited(_) => "rate_limited",
            Rejection::Unauthorized(_) => "unauthorized",
            Rejection::NotFound(_) => "not_found",
            Rejection::Upstream(ForwardError::RequestBody(_)) => "bad_request",
            Rejection::Upstream(ForwardError::PayloadTooLarge) => "payload_too_large",
            Rejection::Upstream(_) => "bad_gateway",
            Rejection::ShuttingDown => "shutting_down",
        }
    }

    /// What the caller sees. Never reveals which auth check failed.
    fn public_message(&self) -> &'static str {
        match self {
            Rejection::RateLimited(_) => "Too many requests",
            Rejection::Unauthorized(_) => "Unauthorized",
            Rejection::NotFound(_) => "Resource not found",
            Rejection::Upstream(ForwardError::RequestBody(_)) => "Invalid request body",
            Rejection::Upstream(ForwardError::PayloadTooLarge) => "Request body too large",
            Rejection::Upstream(_) => "Service unavailable",
            Rejection::ShuttingDown => "Server shutting down",
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = error_response(self.status(), self.public_message());
        let headers = response.headers_mut();

        match &self {
            Rejection::RateLimited(RateLimitError::Exceeded {
                retry_after: Some(wait),
            }) => {
                let secs = wait.as_secs_f64().ceil().max(1.0) as u64;
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            }
            Rejection::Unauthorized(_) => {
                headers.insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Rejection::ShuttingDown => {
                headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }

        response
    }
}
