//! CORS policy, computed from `Origin` (falling back to `Referer`).
//!
//! An origin is honored only if it is file://, 127.0.0.1, localhost, or a
//! subdomain of the configured trusted suffix. Honored origins get
//! Allow-Origin/Credentials; OPTIONS preflights additionally get
//! allowed-methods/headers/max-age. The insecure toggle honors every
//! origin.

use crate::AppState;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Authorization, Content-Type, Accept";
const MAX_AGE_SECS: &str = "86400";

/// The request's origin: the `Origin` header, or one derived from
/// `Referer`.
fn request_origin(request: &Request<Body>) -> Option<String> {
    if let Some(origin) = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
    {
        return Some(origin.to_string());
    }
    let referer = request
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())?;
    origin_of(referer)
}

/// Reduce a URL to its origin (`scheme://host[:port]`).
fn origin_of(url: &str) -> Option<String> {
    let (scheme, rest) = url.split_once("://")?;
    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        // file:// URLs have no authority; the origin is the scheme itself.
        return Some(format!("{scheme}://"));
    }
    Some(format!("{scheme}://{authority}"))
}

/// Hostname part of an origin, without port.
fn origin_host(origin: &str) -> Option<&str> {
    let rest = origin.split_once("://")?.1;
    let host = rest.split('/').next()?.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Whether an origin is allowed to make credentialed requests.
fn origin_honored(origin: &str, trusted_suffix: Option<&str>) -> bool {
    if origin == "null" || origin.starts_with("file://") {
        return true;
    }
    let host = match origin_host(origin) {
        Some(host) => host,
        None => return false,
    };
    if host == "127.0.0.1" || host == "localhost" {
        return true;
    }
    match trusted_suffix {
        Some(suffix) => host == suffix || host.ends_with(&format!(".{suffix}")),
        None => false,
    }
}

/// CORS middleware; also answers OPTIONS preflights before routing.
pub async fn cors(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let origin = request_origin(&request);
    let honored = origin.as_deref().is_some_and(|o| {
        state.host.auth_disabled()
            || origin_honored(o, state.config.trusted_origin_suffix.as_deref())
    });

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        if honored {
            apply_origin(&mut response, origin.as_deref());
            let headers = response.headers_mut();
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOW_HEADERS),
            );
            headers.insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_static(MAX_AGE_SECS),
            );
        }
        return response;
    }

    let mut response = next.run(request).await;
    if honored {
        apply_origin(&mut response, origin.as_deref());
    }
    response
}

fn apply_origin(response: &mut Response, origin: Option<&str>) {
    let Some(origin) = origin else { return };
    if let Ok(value) = HeaderValue::from_str(origin) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("http://localhost:2000/some/page").as_deref(),
            Some("http://localhost:2000")
        );
        assert_eq!(origin_of("file:///home/me/doc.html").as_deref(), Some("file://"));
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn test_local_origins_honored() {
        assert!(origin_honored("http://127.0.0.1:2000", None));
        assert!(origin_honored("http://localhost", None));
        assert!(origin_honored("file://", None));
        assert!(origin_honored("null", None));
    }

    #[test]
    fn test_foreign_origins_rejected() {
        assert!(!origin_honored("http://evil.example.com", None));
        assert!(!origin_honored("https://localhost.evil.com", None));
    }

    #[test]
    fn test_trusted_suffix() {
        let suffix = Some("example.io");
        assert!(origin_honored("https://example.io", suffix));
        assert!(origin_honored("https://app.example.io", suffix));
        assert!(!origin_honored("https://example.io.evil.com", suffix));
        assert!(!origin_honored("https://notexample.io", suffix));
    }
}
