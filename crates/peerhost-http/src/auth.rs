//! Bearer-token authorization middleware.
//!
//! Public routes (home, static assets, manifest) never require a token;
//! everything else requires `Authorization: Bearer <token>`. Verification
//! flows into the host's token authority, so an expired or replayed token
//! is a 403 just like a missing one.

use crate::respond::error_response;
use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Method, Request};
use axum::middleware::Next;
use axum::response::Response;
use peerhost_types::HostError;
use tracing::debug;

/// Routes that are served without a token.
fn is_public(path: &str) -> bool {
    path == "/" || path == "/manifest" || path.starts_with("/static/")
}

/// Extract the bearer token from the Authorization header.
fn bearer(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Authorization middleware.
pub async fn authorize(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.host.auth_disabled()
        || request.method() == Method::OPTIONS
        || is_public(request.uri().path())
    {
        return next.run(request).await;
    }

    let headers = request.headers().clone();
    let token = match bearer(&request) {
        Some(token) => token,
        None => {
            return error_response(
                &headers,
                &HostError::AuthRequired(
                    "this route requires an Authorization: Bearer token".to_string(),
                ),
            );
        }
    };

    match state.host.authorize_token(token) {
        Ok(claims) => {
            if let Some(claims) = claims {
                debug!(peer = %claims.hid, seq = claims.seq, "Authorized peer request");
            }
            next.run(request).await
        }
        Err(e) => error_response(&headers, &e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_routes() {
        assert!(is_public("/"));
        assert!(is_public("/manifest"));
        assert!(is_public("/static/logo.png"));
        assert!(!is_public("/nodeContext1"));
        assert!(!is_public("/environ/local"));
    }
}
