//! HTTP transport: binds Host operations to an HTTP request/response
//! surface.
//!
//! Owns request authorization (bearer tokens), CORS policy, routing, and
//! response formatting (JSON or plain text depending on `Accept`). The
//! routing grammar:
//!
//! | Verb | Path | Action |
//! |---|---|---|
//! | OPTIONS | * | preflight ack |
//! | GET | `/` | home page |
//! | GET | `/static/<rest>` | static asset |
//! | GET | `/manifest` | host manifest |
//! | POST | `/<type>` | create instance |
//! | GET | `/<name>` | instance representation |
//! | PUT | `/<name>!<method>` | call method |
//! | DELETE | `/<name>` | delete instance |
//! | POST/DELETE | `/environ/<id>` | environ startup/shutdown |
//! | anything else | - | 400 |

mod auth;
mod cors;
mod respond;
mod routes;
mod statics;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use peerhost_host::Host;
use peerhost_types::{HostResult, ServerBinding};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Transport-level configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Origins under this suffix are honored by CORS, in addition to
    /// file://, 127.0.0.1, and localhost.
    pub trusted_origin_suffix: Option<String>,
    /// Root directory for `/static/` assets.
    pub static_root: PathBuf,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            trusted_origin_suffix: None,
            static_root: PathBuf::from("static"),
        }
    }
}

/// Shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    /// The host this transport serves.
    pub host: Arc<Host>,
    /// Transport configuration.
    pub config: Arc<TransportConfig>,
}

/// Build the router for a host.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/manifest", get(routes::manifest))
        .route("/static/{*path}", get(statics::static_asset))
        .route(
            "/environ/{id}",
            post(routes::environ_startup).delete(routes::environ_shutdown),
        )
        .route(
            "/{target}",
            post(routes::create)
                .get(routes::get_instance)
                .put(routes::call)
                .delete(routes::delete_instance),
        )
        .fallback(routes::bad_route)
        .method_not_allowed_fallback(routes::bad_route)
        .layer(middleware::from_fn_with_state(state.clone(), auth::authorize))
        .layer(middleware::from_fn_with_state(state.clone(), cors::cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind a listener, register the binding in the host manifest, and serve
/// until the host's supervisor signals shutdown.
///
/// Stopping is non-graceful: the serve future is dropped, closing active
/// connections rather than draining them.
pub async fn serve(
    host: Arc<Host>,
    config: TransportConfig,
    addr: SocketAddr,
) -> HostResult<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    host.register_server(
        "http",
        ServerBinding {
            address: local.ip().to_string(),
            port: local.port(),
            url: format!("http://{local}"),
        },
    )?;

    let app = router(AppState {
        host: Arc::clone(&host),
        config: Arc::new(config),
    });
    let mut shutdown = host.supervisor().subscribe();
    info!(host = %host.id(), address = %local, "HTTP transport listening");

    let handle = tokio::spawn(async move {
        tokio::select! {
            result = axum::serve(listener, app) => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "HTTP transport failed");
                }
            }
            _ = shutdown.changed() => {}
        }
    });
    Ok((local, handle))
}
