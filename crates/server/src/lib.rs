//! Library crate backing both the `claude-history-server` binary and the
//! `claude-history-keygen` tool. Grounded on the teacher's `lib.rs`
//! `create_app*` family, generalized to this spec's route set, CORS policy,
//! and middleware order (request log → auth → router).

pub mod auth;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod file_watcher;
pub mod heartbeat;
pub mod indexer;
pub mod request_log;
pub mod routes;
pub mod session_store;
pub mod state;
pub mod ws;

use std::sync::Arc;

use axum::http::{HeaderName, Method};
use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Permissive CORS per this server's external-interface contract — a
/// deliberate departure from a browser-facing product's locked-down
/// localhost policy, since this server is meant to be reachable from
/// whatever host the companion client runs on.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([HeaderName::from_static("content-type"), HeaderName::from_static("x-api-key")])
}

/// Builds the full HTTP + websocket router over an already-constructed
/// `AppState`. Middleware order: request log, then the router's own
/// per-route auth layer (installed inside `routes::api_routes`).
pub fn create_app(state: Arc<AppState>) -> Router {
    routes::api_routes(state.clone())
        .merge(ws::router().with_state(state.clone()))
        .layer(middleware::from_fn_with_state(state, request_log::log_requests))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use claude_history_db::Database;

    #[tokio::test]
    async fn create_app_does_not_panic() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(config::ConfigService::load(dir.path().join("config.json")).await.unwrap());
        let state = AppState::new(db, config, dir.path().to_path_buf());
        let _app = create_app(state);
    }
}
