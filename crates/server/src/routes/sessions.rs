//! `/sessions` listing and per-session operations.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use claude_history_types::{Pagination, Session, SessionFilter, SessionListResponse};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    automatic: Option<bool>,
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<SessionListResponse>> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let filter = match query.automatic {
        Some(true) => SessionFilter::AutomaticOnly,
        Some(false) => SessionFilter::ManualOnly,
        None => SessionFilter::All,
    };

    let sessions = state.db.list_recent_sessions(limit, offset, filter).await?;
    let has_more = sessions.len() as i64 == limit;
    Ok(Json(SessionListResponse {
        sessions,
        pagination: Pagination { limit, offset, has_more },
    }))
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetail {
    #[serde(flatten)]
    session: Session,
    messages: Vec<claude_history_types::Message>,
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionDetail>> {
    let session = state
        .db
        .get_session_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    let messages = state.db.get_messages_by_session_id(&id).await?;
    Ok(Json(SessionDetail { session, messages }))
}

#[derive(Debug, serde::Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn hide_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .db
        .get_session_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    state.db.hide_session(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn mark_session_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    state
        .db
        .get_session_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("session {id}")))?;
    state.db.mark_read(&id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(hide_session))
        .route("/sessions/{id}/read", post(mark_session_read))
}
