//! Static asset serving with a traversal guard.
//!
//! Assets are served from a fixed root; any resolved path that escapes the
//! root is rejected with 403, whatever the traversal sequence.

use crate::respond::failure;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use std::path::Component;

/// GET `/static/<rest>`.
pub async fn static_asset(
    State(state): State<AppState>,
    Path(rest): Path<String>,
    headers: HeaderMap,
) -> Response {
    let relative = std::path::Path::new(&rest);
    // Reject traversal before touching the filesystem, so a `..` sequence
    // is 403 even when the target does not exist.
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return forbidden(&headers, &rest);
    }

    let root = match state.config.static_root.canonicalize() {
        Ok(root) => root,
        Err(_) => return not_found(&headers, &rest),
    };
    let resolved = match root.join(relative).canonicalize() {
        Ok(resolved) => resolved,
        Err(_) => return not_found(&headers, &rest),
    };
    // Symlinks can still point outside the root.
    if !resolved.starts_with(&root) {
        return forbidden(&headers, &rest);
    }

    match tokio::fs::read(&resolved).await {
        Ok(contents) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type(&rest))],
            contents,
        )
            .into_response(),
        Err(_) => not_found(&headers, &rest),
    }
}

fn forbidden(headers: &HeaderMap, rest: &str) -> Response {
    failure(
        headers,
        StatusCode::FORBIDDEN,
        "forbidden",
        &format!("static path escapes the asset root: {rest}"),
    )
}

fn not_found(headers: &HeaderMap, rest: &str) -> Response {
    failure(
        headers,
        StatusCode::NOT_FOUND,
        "not-found",
        &format!("no such asset: {rest}"),
    )
}

/// Content type by file extension; octet-stream otherwise.
fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("svg") => "image/svg+xml",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type("index.html"), "text/html; charset=utf-8");
        assert_eq!(content_type("app.js"), "text/javascript");
        assert_eq!(content_type("blob"), "application/octet-stream");
    }
}
