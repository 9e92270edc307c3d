//! Route handlers binding Host operations to HTTP.

use crate::respond::{error_response, failure, ok_json};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{Html, Response};
use peerhost_types::HostError;
use serde_json::{json, Value};

/// Parse an optional JSON request body; an empty body is `null`.
fn parse_body(body: &Bytes) -> Result<Value, HostError> {
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(HostError::from)
}

/// GET `/`: minimal home page.
pub async fn home(State(state): State<AppState>) -> Html<String> {
    let manifest = state.host.manifest();
    Html(format!(
        "<!doctype html>\n<html>\n<head><title>{package}</title></head>\n<body>\n\
         <h1>{package} {version}</h1>\n<p>Host <code>{id}</code></p>\n\
         <p><a href=\"/manifest\">manifest</a></p>\n</body>\n</html>\n",
        package = manifest.package,
        version = manifest.version,
        id = manifest.id,
    ))
}

/// GET `/manifest`: the host manifest as JSON.
pub async fn manifest(State(state): State<AppState>, headers: HeaderMap) -> Response {
    match serde_json::to_value(state.host.manifest()) {
        Ok(value) => ok_json(&headers, value),
        Err(e) => error_response(&headers, &HostError::from(e)),
    }
}

/// POST `/<type>`: create an instance.
pub async fn create(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let options = match parse_body(&body) {
        Ok(options) => options,
        Err(e) => return error_response(&headers, &e),
    };
    match state.host.create(&target, options).await {
        Ok(result) => ok_json(
            &headers,
            json!({"name": result.name, "value": result.value}),
        ),
        Err(e) => error_response(&headers, &e),
    }
}

/// GET `/<name>`: instance representation.
pub async fn get_instance(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.host.get(&target).await {
        Ok(value) => ok_json(&headers, value),
        Err(e) => error_response(&headers, &e),
    }
}

/// PUT `/<name>!<method>`: call a method on an instance.
pub async fn call(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some((name, method)) = target.split_once('!') else {
        return error_response(
            &headers,
            &HostError::RouteNotFound(format!("PUT /{target}: expected /<name>!<method>")),
        );
    };
    if name.is_empty() || method.is_empty() {
        return error_response(
            &headers,
            &HostError::RouteNotFound(format!("PUT /{target}: expected /<name>!<method>")),
        );
    }
    let args = match parse_body(&body) {
        Ok(args) => args,
        Err(e) => return error_response(&headers, &e),
    };
    match state.host.call(name, method, args).await {
        Ok(value) => ok_json(&headers, value),
        Err(e) => error_response(&headers, &e),
    }
}

/// DELETE `/<name>`: delete an instance.
pub async fn delete_instance(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.host.delete(&target).await {
        Ok(()) => ok_json(&headers, json!({"name": target, "deleted": true})),
        Err(e) => error_response(&headers, &e),
    }
}

/// POST `/environ/<id>`: start an execution environment.
pub async fn environ_startup(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.host.environ_startup(&id) {
        Ok(()) => ok_json(&headers, json!({"id": id, "started": true})),
        Err(e) => error_response(&headers, &e),
    }
}

/// DELETE `/environ/<id>`: shut down an execution environment.
pub async fn environ_shutdown(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    match state.host.environ_shutdown(&id) {
        Ok(()) => ok_json(&headers, json!({"id": id, "started": false})),
        Err(e) => error_response(&headers, &e),
    }
}

/// Anything that matches no route is a 400, not a 404.
pub async fn bad_route(uri: Uri, headers: HeaderMap) -> Response {
    failure(
        &headers,
        StatusCode::BAD_REQUEST,
        "route-not-found",
        &format!("no route for {uri}"),
    )
}
