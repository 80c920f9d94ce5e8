//! `/search` — free-text search with prefix-query sanitization and
//! per-session deduplication. Sanitization and dedup are router-layer
//! policy, not Store features (the Store returns raw ranked hits).

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use claude_history_types::{Pagination, SearchHit, SearchResponse, SearchSort};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<i64>,
    offset: Option<i64>,
    sort: Option<SearchSort>,
    automatic: Option<bool>,
}

/// Strips `{' " * ( )`}`, splits on whitespace, appends `*` to each
/// remaining token for prefix matching, and rejoins with spaces. Returns
/// `None` if nothing survives sanitization.
fn sanitize_query(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !"'\"*()`".contains(*c)).collect();
    let tokens: Vec<String> = stripped
        .split_whitespace()
        .map(|token| format!("{token}*"))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

async fn search(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let Some(fts_query) = sanitize_query(&query.q) else {
        return Err(ApiError::InvalidInput("invalid query".to_string()));
    };

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0).max(0);
    let sort = query.sort.unwrap_or_default();

    // Fetch enough raw hits that per-session dedup still leaves `limit`
    // distinct sessions after `offset` is applied.
    let raw_limit = 3 * (limit + offset);
    let raw_hits = state
        .db
        .search_messages(&fts_query, raw_limit, 0, sort, query.automatic)
        .await?;

    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<SearchHit> = Vec::new();
    for hit in raw_hits {
        if seen.insert(hit.session_id.clone()) {
            deduped.push(hit);
        }
    }

    let total_unique = deduped.len() as i64;
    let page: Vec<SearchHit> = deduped
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    let has_more = total_unique > offset + limit;

    Ok(Json(SearchResponse {
        results: page,
        pagination: Pagination { limit, offset, has_more },
        query: query.q,
        sort,
    }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/search", get(search))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_forbidden_chars_and_appends_prefix_star() {
        assert_eq!(sanitize_query("react hooks"), Some("react* hooks*".to_string()));
        assert_eq!(sanitize_query("\"quoted\" term"), Some("quoted* term*".to_string()));
    }

    #[test]
    fn sanitize_of_empty_or_symbols_only_is_none() {
        assert_eq!(sanitize_query(""), None);
        assert_eq!(sanitize_query("***"), None);
        assert_eq!(sanitize_query("   "), None);
    }

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use claude_history_db::{Database, IndexSessionParams};
    use claude_history_types::{Message, Role};
    use tower::ServiceExt;

    async fn seeded_app() -> Router {
        let db = Database::new_in_memory().await.unwrap();
        db.index_session(IndexSessionParams {
            session_id: "abc",
            project: "/tmp/demo",
            started_at: 1000,
            last_activity_at: 2000,
            preview: "react question",
            title: None,
            is_automatic: false,
            last_indexed: 1,
            messages: &[
                Message {
                    uuid: "u1".into(),
                    session_id: String::new(),
                    role: Role::User,
                    content: "How do I create a React component?".into(),
                    timestamp: Some(1000),
                },
                Message {
                    uuid: "a1".into(),
                    session_id: String::new(),
                    role: Role::Assistant,
                    content: "Use a function that returns React markup.".into(),
                    timestamp: Some(2000),
                },
            ],
        })
        .await
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(crate::config::ConfigService::load(dir.path().join("config.json")).await.unwrap());
        let state = AppState::new(db, config, dir.path().to_path_buf());
        Router::new().merge(router()).with_state(state)
    }

    #[tokio::test]
    async fn search_dedupes_multiple_hits_in_same_session() {
        let app = seeded_app().await;
        let response = app
            .oneshot(Request::builder().uri("/search?q=react").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: SearchResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.results.len(), 1);
        assert_eq!(body.results[0].session_id, "abc");
        assert!(body.results[0].highlighted_content.contains("<mark>"));
    }

    #[tokio::test]
    async fn empty_query_after_sanitize_is_400() {
        let app = seeded_app().await;
        let response = app
            .oneshot(Request::builder().uri("/search?q=***").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
