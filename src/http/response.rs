//! Gateway-generated responses.
//!
//! Backend responses are relayed untouched; only responses the gateway itself
//! produces (rejections, 404s) go through here. They share one JSON envelope:
//! `{"success": false, "message": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}
