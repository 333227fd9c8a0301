//! Built-in responses.
//!
//! # Design Decisions
//! - JSON bodies of the form `{"error": <code>, "message": <text>}`
//! - Used whenever no fallback pipe is configured, or a fallback fails

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::pipe::Response;

/// A JSON error response.
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({ "error": code, "message": message }))).into_response()
}

/// No route matched, or a chain fell through without answering.
pub fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "no route matches this host")
}

/// A chain failed or panicked.
pub fn internal_error() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "the request could not be processed",
    )
}

/// The upstream origin could not be reached.
pub fn bad_gateway() -> Response {
    error_response(StatusCode::BAD_GATEWAY, "bad_gateway", "upstream request failed")
}

/// The hub is shutting down.
pub fn shutting_down() -> Response {
    let mut res = error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "shutting_down",
        "the server is shutting down",
    );
    res.headers_mut().insert(
        axum::http::header::CONNECTION,
        axum::http::HeaderValue::from_static("close"),
    );
    res
}
