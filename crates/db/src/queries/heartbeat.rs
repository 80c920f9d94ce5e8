use claude_history_types::HeartbeatState;
use sqlx::Row;

use crate::{Database, DbResult};

impl Database {
    pub async fn get_heartbeat_state(&self, key: &str) -> DbResult<Option<HeartbeatState>> {
        let row = sqlx::query("SELECT * FROM heartbeat_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| state_from_row(&r)))
    }

    pub async fn upsert_heartbeat_state(
        &self,
        key: &str,
        last_changed: Option<&str>,
        last_processed: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO heartbeat_state (key, last_changed, last_processed)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                last_changed   = excluded.last_changed,
                last_processed = excluded.last_processed
            "#,
        )
        .bind(key)
        .bind(last_changed)
        .bind(last_processed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_all_heartbeat_state(&self) -> DbResult<Vec<HeartbeatState>> {
        let rows = sqlx::query("SELECT * FROM heartbeat_state ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(state_from_row).collect())
    }
}

fn state_from_row(row: &sqlx::sqlite::SqliteRow) -> HeartbeatState {
    HeartbeatState {
        key: row.get("key"),
        last_changed: row.get("last_changed"),
        last_processed: row.get("last_processed"),
    }
}
