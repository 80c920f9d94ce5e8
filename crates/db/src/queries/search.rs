use claude_history_types::{Role, SearchHit, SearchSort};
use sqlx::Row;

use crate::queries::role_from_str;
use crate::{Database, DbResult};

impl Database {
    /// Full-text search over message content via the `messages_fts` index.
    /// `fts_query` is passed straight to FTS5's `MATCH` operator, so the
    /// caller is responsible for quoting/escaping terms (see the HTTP layer's
    /// prefix-query construction). Hidden sessions are always excluded.
    /// Per-session deduplication is a caller-layer concern; this returns raw
    /// ranked hits, possibly several per session.
    pub async fn search_messages(
        &self,
        fts_query: &str,
        limit: i64,
        offset: i64,
        sort: SearchSort,
        automatic_only: Option<bool>,
    ) -> DbResult<Vec<SearchHit>> {
        let order_by = match sort {
            SearchSort::Relevance => "bm25(messages_fts) ASC",
            SearchSort::Date => "s.started_at DESC, bm25(messages_fts) ASC",
        };
        let sql = format!(
            r#"
            SELECT
                m.session_id        AS session_id,
                s.started_at        AS session_started_at,
                m.uuid               AS message_uuid,
                m.role               AS role,
                highlight(messages_fts, 0, '<mark>', '</mark>') AS highlighted_content,
                m.timestamp          AS timestamp
            FROM messages_fts
            JOIN messages m ON m.rowid = messages_fts.rowid
            JOIN sessions s ON s.id = m.session_id
            WHERE messages_fts MATCH ?1
              AND s.is_hidden = 0
              AND (?2 IS NULL OR s.is_automatic = ?2)
            ORDER BY {order_by}
            LIMIT ?3 OFFSET ?4
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(fts_query)
            .bind(automatic_only)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| SearchHit {
                session_id: row.get("session_id"),
                session_started_at: row.get("session_started_at"),
                message_uuid: row.get("message_uuid"),
                role: role_from_str(row.get::<String, _>("role").as_str()),
                highlighted_content: row.get("highlighted_content"),
                timestamp: row.get("timestamp"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IndexSessionParams;
    use claude_history_types::Message;

    async fn seeded() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.index_session(IndexSessionParams {
            session_id: "s1",
            project: "/tmp/demo",
            started_at: 1000,
            last_activity_at: 3000,
            preview: "about rust borrow checker",
            title: None,
            is_automatic: false,
            last_indexed: 1,
            messages: &[
                Message {
                    uuid: "u1".into(),
                    session_id: String::new(),
                    role: Role::User,
                    content: "tell me about the borrow checker".into(),
                    timestamp: Some(1000),
                },
                Message {
                    uuid: "a1".into(),
                    session_id: String::new(),
                    role: Role::Assistant,
                    content: "the borrow checker enforces aliasing rules".into(),
                    timestamp: Some(2000),
                },
            ],
        })
        .await
        .unwrap();
        db.index_session(IndexSessionParams {
            session_id: "s2",
            project: "/tmp/demo",
            started_at: 500,
            last_activity_at: 500,
            preview: "unrelated",
            title: None,
            is_automatic: true,
            last_indexed: 1,
            messages: &[Message {
                uuid: "u2".into(),
                session_id: String::new(),
                role: Role::User,
                content: "completely unrelated topic".into(),
                timestamp: Some(500),
            }],
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn finds_matching_messages_across_sessions() {
        let db = seeded().await;
        let hits = db
            .search_messages("borrow", 20, 0, SearchSort::Relevance, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.session_id == "s1"));
    }

    #[tokio::test]
    async fn highlight_markers_wrap_matched_term() {
        let db = seeded().await;
        let hits = db
            .search_messages("borrow", 20, 0, SearchSort::Relevance, None)
            .await
            .unwrap();
        assert!(hits[0].highlighted_content.contains("<mark>"));
    }

    #[tokio::test]
    async fn automatic_only_filter_narrows_results() {
        let db = seeded().await;
        let hits = db
            .search_messages("unrelated", 20, 0, SearchSort::Relevance, Some(true))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].session_id, "s2");

        let hits = db
            .search_messages("unrelated", 20, 0, SearchSort::Relevance, Some(false))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn hidden_sessions_excluded_from_search() {
        let db = seeded().await;
        db.hide_session("s1").await.unwrap();
        let hits = db
            .search_messages("borrow", 20, 0, SearchSort::Relevance, None)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn date_sort_orders_by_session_start() {
        let db = Database::new_in_memory().await.unwrap();
        db.index_session(IndexSessionParams {
            session_id: "old",
            project: "/tmp",
            started_at: 100,
            last_activity_at: 100,
            preview: "p",
            title: None,
            is_automatic: false,
            last_indexed: 1,
            messages: &[Message {
                uuid: "u1".into(),
                session_id: String::new(),
                role: Role::User,
                content: "shared term".into(),
                timestamp: Some(100),
            }],
        })
        .await
        .unwrap();
        db.index_session(IndexSessionParams {
            session_id: "new",
            project: "/tmp",
            started_at: 900,
            last_activity_at: 900,
            preview: "p",
            title: None,
            is_automatic: false,
            last_indexed: 1,
            messages: &[Message {
                uuid: "u2".into(),
                session_id: String::new(),
                role: Role::User,
                content: "shared term".into(),
                timestamp: Some(900),
            }],
        })
        .await
        .unwrap();

        let hits = db
            .search_messages("shared", 20, 0, SearchSort::Date, None)
            .await
            .unwrap();
        assert_eq!(hits[0].session_id, "new");
        assert_eq!(hits[1].session_id, "old");
    }
}
