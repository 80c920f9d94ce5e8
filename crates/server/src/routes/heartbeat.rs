//! `/heartbeat` trigger and `/heartbeat/status` snapshot.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::error::ApiResult;
use crate::heartbeat::{HeartbeatRunResult, HeartbeatStatus};
use crate::state::AppState;

async fn run_heartbeat(State(state): State<Arc<AppState>>) -> ApiResult<Json<HeartbeatRunResult>> {
    if state.config.document().heartbeat.working_directory.trim().is_empty() {
        return Err(crate::error::ApiError::Unavailable(
            "heartbeat working directory not configured".to_string(),
        ));
    }
    let result = state.heartbeat.run_heartbeat(true).await;
    Ok(Json(result))
}

async fn heartbeat_status(State(state): State<Arc<AppState>>) -> Json<HeartbeatStatus> {
    Json(state.heartbeat.status().await)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/heartbeat", post(run_heartbeat))
        .route("/heartbeat/status", get(heartbeat_status))
}
