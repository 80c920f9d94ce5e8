//! `/api/config` — read/update the editable config sections. Grounded on
//! the teacher's `routes/settings.rs` handler/router/test shape.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn get_all_sections(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.config.get_all_editable_sections())
}

async fn get_section(
    State(state): State<Arc<AppState>>,
    Path(section): Path<String>,
) -> ApiResult<Json<Value>> {
    state
        .config
        .get_section(&section)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("config section {section}")))
}

async fn put_section(
    State(state): State<Arc<AppState>>,
    Path(section): Path<String>,
    Json(patch): Json<Value>,
) -> ApiResult<Json<Value>> {
    let updated = state.config.update_section(&section, patch).await?;
    Ok(Json(updated))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/config", get(get_all_sections))
        .route("/api/config/{section}", get(get_section).put(put_section))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use claude_history_db::Database;
    use tower::ServiceExt;

    async fn app() -> Router {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(crate::config::ConfigService::load(dir.path().join("config.json")).await.unwrap());
        let state = AppState::new(db, config, dir.path().to_path_buf());
        Router::new().merge(router()).with_state(state)
    }

    #[tokio::test]
    async fn get_all_sections_never_exposes_api_key_hash() {
        let app = app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body.get("apiKeyHash").is_none());
        assert!(body.get("heartbeat").is_some());
    }

    #[tokio::test]
    async fn get_unknown_section_is_404() {
        let app = app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/config/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_invalid_patch_is_400() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/config/heartbeat")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&serde_json::json!({"intervalMs": 10})).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_valid_patch_updates_section() {
        let app = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/config/security")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        serde_json::to_vec(&serde_json::json!({"allowedWorkingDirs": ["/tmp"]})).unwrap(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["allowedWorkingDirs"][0], "/tmp");
    }
}
