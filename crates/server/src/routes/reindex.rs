//! `/reindex` — triggers a full indexer pass on demand.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct ReindexQuery {
    force: Option<bool>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct ReindexResponse {
    success: bool,
    indexed: u64,
    skipped: u64,
}

async fn reindex(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReindexQuery>,
) -> ApiResult<Json<ReindexResponse>> {
    let result = state.indexer.run(query.force.unwrap_or(false)).await;
    *state.last_index_result.write().await = result;
    Ok(Json(ReindexResponse {
        success: true,
        indexed: result.indexed,
        skipped: result.skipped,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/reindex", post(reindex))
}
