use claude_history_types::{Message, Session, SessionFilter, Stats};
use sqlx::Row;

use crate::queries::{role_from_str, role_to_str};
use crate::{Database, DbResult};

/// Parameters for an atomic session replace. `is_hidden`/`is_unread` are
/// deliberately absent: `index_session` never touches them, preserving
/// whatever a prior client action set.
pub struct IndexSessionParams<'a> {
    pub session_id: &'a str,
    pub project: &'a str,
    pub started_at: i64,
    pub last_activity_at: i64,
    pub preview: &'a str,
    pub title: Option<&'a str>,
    pub is_automatic: bool,
    pub last_indexed: i64,
    pub messages: &'a [Message],
}

impl Database {
    /// Atomic replace: delete all message rows for `session_id`, upsert the
    /// session row, insert all message rows, all in one transaction.
    /// `is_hidden`/`is_unread` survive the upsert untouched.
    pub async fn index_session(&self, params: IndexSessionParams<'_>) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(params.session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO sessions
                (id, project, started_at, last_activity_at, message_count, preview, title, last_indexed, is_automatic, is_unread, is_hidden)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 0)
            ON CONFLICT(id) DO UPDATE SET
                project          = excluded.project,
                started_at       = MIN(sessions.started_at, excluded.started_at),
                last_activity_at = MAX(sessions.last_activity_at, excluded.last_activity_at),
                message_count    = excluded.message_count,
                preview          = excluded.preview,
                title            = COALESCE(excluded.title, sessions.title),
                last_indexed     = excluded.last_indexed,
                is_automatic     = excluded.is_automatic
            "#,
        )
        .bind(params.session_id)
        .bind(params.project)
        .bind(params.started_at)
        .bind(params.last_activity_at)
        .bind(params.messages.len() as i64)
        .bind(params.preview)
        .bind(params.title)
        .bind(params.last_indexed)
        .bind(params.is_automatic)
        .execute(&mut *tx)
        .await?;

        for m in params.messages {
            sqlx::query(
                "INSERT INTO messages (uuid, session_id, role, content, timestamp) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&m.uuid)
            .bind(params.session_id)
            .bind(role_to_str(m.role))
            .bind(&m.content)
            .bind(m.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_session_by_id(&self, id: &str) -> DbResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| session_from_row(&r)))
    }

    /// Ordered by timestamp ascending; rows with no timestamp sort last.
    pub async fn get_messages_by_session_id(&self, id: &str) -> DbResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? ORDER BY (timestamp IS NULL), timestamp ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }

    /// Excludes hidden sessions; ordered by `coalesce(last_activity_at, started_at) desc`.
    pub async fn list_recent_sessions(
        &self,
        limit: i64,
        offset: i64,
        filter: SessionFilter,
    ) -> DbResult<Vec<Session>> {
        let filter_clause = match filter {
            SessionFilter::All => "",
            SessionFilter::ManualOnly => "AND is_automatic = 0",
            SessionFilter::AutomaticOnly => "AND is_automatic = 1",
        };
        let sql = format!(
            "SELECT * FROM sessions WHERE is_hidden = 0 {filter_clause} \
             ORDER BY COALESCE(last_activity_at, started_at) DESC LIMIT ? OFFSET ?"
        );
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(session_from_row).collect())
    }

    pub async fn mark_read(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET is_unread = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn hide_session(&self, id: &str) -> DbResult<()> {
        sqlx::query("UPDATE sessions SET is_hidden = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Used by the indexer to decide whether a file needs reindexing.
    pub async fn get_session_last_indexed(&self, id: &str) -> DbResult<Option<i64>> {
        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT last_indexed FROM sessions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(v,)| v))
    }

    /// Marks a newly-created automatic session unread, matching the
    /// invariant that automatic sessions start unread.
    pub async fn mark_unread_if_new(&self, id: &str) -> DbResult<()> {
        sqlx::query(
            "UPDATE sessions SET is_unread = 1 WHERE id = ? AND message_count > 0 AND is_automatic = 1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_stats(&self) -> DbResult<Stats> {
        let (session_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        let (message_count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        let (page_count,): (i64,) = sqlx::query_as("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await?;
        let (page_size,): (i64,) = sqlx::query_as("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await?;
        Ok(Stats {
            session_count,
            message_count,
            database_size_bytes: page_count * page_size,
        })
    }
}

fn session_from_row(row: &sqlx::sqlite::SqliteRow) -> Session {
    Session {
        id: row.get("id"),
        project: row.get("project"),
        started_at: row.get("started_at"),
        last_activity_at: row.get("last_activity_at"),
        message_count: row.get("message_count"),
        preview: row.get("preview"),
        title: row.get("title"),
        last_indexed: row.get("last_indexed"),
        is_automatic: row.get::<i64, _>("is_automatic") != 0,
        is_unread: row.get::<i64, _>("is_unread") != 0,
        is_hidden: row.get::<i64, _>("is_hidden") != 0,
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        uuid: row.get("uuid"),
        session_id: row.get("session_id"),
        role: role_from_str(row.get::<String, _>("role").as_str()),
        content: row.get("content"),
        timestamp: row.get("timestamp"),
    }
}
