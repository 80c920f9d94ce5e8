//! Route modules and the combined router. Unlike the teacher, paths are not
//! uniformly nested under `/api` — only the config endpoints are. `/health`
//! and `/admin` are left outside the auth middleware.

pub mod admin;
pub mod config;
pub mod diagnostics;
pub mod health;
pub mod heartbeat;
pub mod reindex;
pub mod search;
pub mod sessions;

use std::sync::Arc;

use axum::middleware;
use axum::Router;

use crate::auth::require_api_key;
use crate::state::AppState;

/// Builds every HTTP route. `/health` is merged in outside the auth layer;
/// everything else goes through `require_api_key`.
pub fn api_routes(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(sessions::router())
        .merge(search::router())
        .merge(reindex::router())
        .merge(heartbeat::router())
        .merge(config::router())
        .merge(diagnostics::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(health::router())
        .merge(admin::router())
        .merge(protected)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use claude_history_db::Database;
    use sha2::{Digest, Sha256};
    use tower::ServiceExt;

    async fn state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(crate::config::ConfigService::load(dir.path().join("config.json")).await.unwrap());
        AppState::new(db, config, dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn health_is_reachable_without_a_key_even_when_one_is_configured() {
        let state = state().await;
        state
            .config
            .set_api_key_hash(hex::encode(Sha256::digest(b"secret")))
            .await
            .unwrap();
        let app = api_routes(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_is_reachable_without_a_key_even_when_one_is_configured() {
        let state = state().await;
        state
            .config
            .set_api_key_hash(hex::encode(Sha256::digest(b"secret")))
            .await
            .unwrap();
        let app = api_routes(state);
        let response = app
            .oneshot(Request::builder().uri("/admin").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_route_rejects_missing_key_when_configured() {
        let state = state().await;
        state
            .config
            .set_api_key_hash(hex::encode(Sha256::digest(b"secret")))
            .await
            .unwrap();
        let app = api_routes(state);
        let response = app
            .oneshot(Request::builder().uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
