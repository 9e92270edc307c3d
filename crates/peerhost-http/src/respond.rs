//! Response formatting: JSON or a single plain-text line, by `Accept`.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use peerhost_types::HostError;
use serde_json::{json, Value};

/// Whether the client accepts JSON. Absent `Accept` means JSON.
pub fn wants_json(headers: &HeaderMap) -> bool {
    match headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(accept) => accept.contains("json") || accept.contains("*/*"),
    }
}

/// A 200 response carrying a JSON value (or its text rendering).
pub fn ok_json(headers: &HeaderMap, value: Value) -> Response {
    if wants_json(headers) {
        Json(value).into_response()
    } else {
        value.to_string().into_response()
    }
}

/// An error response with a machine-readable code and human details.
pub fn failure(headers: &HeaderMap, status: StatusCode, code: &str, details: &str) -> Response {
    if wants_json(headers) {
        (status, Json(json!({"error": code, "details": details}))).into_response()
    } else {
        (status, format!("{code}: {details}\n")).into_response()
    }
}

/// Map a host error onto its HTTP status code.
pub fn status_for(err: &HostError) -> StatusCode {
    if err.is_auth() {
        StatusCode::FORBIDDEN
    } else if err.is_not_found() || matches!(err, HostError::UnknownType(_)) {
        StatusCode::NOT_FOUND
    } else if matches!(err, HostError::RouteNotFound(_)) {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

/// Render a host error as a response.
pub fn error_response(headers: &HeaderMap, err: &HostError) -> Response {
    failure(headers, status_for(err), err.code(), &err.to_string())
}
