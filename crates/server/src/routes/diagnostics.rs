//! `/diagnostics` — a point-in-time snapshot of server health, useful for
//! companion clients to show connection/index status without scraping logs.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use claude_history_types::Stats;

use crate::diagnostics::ErrorEntry;
use crate::error::ApiResult;
use crate::heartbeat::HeartbeatStatus;
use crate::indexer::IndexResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticsResponse {
    uptime_secs: u64,
    stats: Stats,
    watcher_active: bool,
    ws_client_count: u64,
    heartbeat: HeartbeatStatus,
    last_index_result: IndexResult,
    recent_errors: Vec<ErrorEntry>,
}

async fn diagnostics(State(state): State<Arc<AppState>>) -> ApiResult<Json<DiagnosticsResponse>> {
    let stats = state.db.get_stats().await?;
    let watcher_active = state.file_watcher.read().await.is_some();
    let heartbeat = state.heartbeat.status().await;
    let last_index_result = *state.last_index_result.read().await;

    Ok(Json(DiagnosticsResponse {
        uptime_secs: state.uptime_secs(),
        stats,
        watcher_active,
        ws_client_count: state.ws_client_count.load(Ordering::Relaxed),
        heartbeat,
        last_index_result,
        recent_errors: state.diagnostics.recent_errors(),
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/diagnostics", get(diagnostics))
}
