/// Inline SQL migrations for the claude-history-server database schema.
///
/// Simple inline migrations rather than sqlx migration files: the schema is
/// small and self-contained, and this mirrors the version-tracked
/// `_migrations` table approach the rest of the workspace uses.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions table
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    id                 TEXT PRIMARY KEY,
    project            TEXT NOT NULL,
    started_at         INTEGER NOT NULL,
    last_activity_at   INTEGER NOT NULL,
    message_count      INTEGER NOT NULL DEFAULT 0,
    preview            TEXT NOT NULL DEFAULT '',
    title              TEXT,
    last_indexed       INTEGER,
    is_automatic       INTEGER NOT NULL DEFAULT 0,
    is_unread          INTEGER NOT NULL DEFAULT 0,
    is_hidden          INTEGER NOT NULL DEFAULT 0
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_last_activity ON sessions(last_activity_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_hidden ON sessions(is_hidden);"#,
    // Migration 2: messages table
    r#"
CREATE TABLE IF NOT EXISTS messages (
    uuid        TEXT NOT NULL,
    session_id  TEXT NOT NULL REFERENCES sessions(id),
    role        TEXT NOT NULL,
    content     TEXT NOT NULL,
    timestamp   INTEGER,
    PRIMARY KEY (session_id, uuid)
);
"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);"#,
    // Migration 3: full-text index over message content, kept in sync with
    // the messages table by rowid via AFTER triggers. `messages` keeps its
    // implicit integer rowid despite the composite primary key above.
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(content, content='messages', content_rowid='rowid');"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES('delete', old.rowid, old.content);
END;
"#,
    r#"
CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES('delete', old.rowid, old.content);
    INSERT INTO messages_fts(rowid, content) VALUES (new.rowid, new.content);
END;
"#,
    // Migration 4: heartbeat watermarks
    r#"
CREATE TABLE IF NOT EXISTS heartbeat_state (
    key            TEXT PRIMARY KEY,
    last_changed   TEXT,
    last_processed INTEGER
);
"#,
];
