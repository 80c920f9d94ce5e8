//! Wire and domain types shared across the ingestion, storage and transport
//! crates. Everything here is plain data: no I/O, no async.

use serde::{Deserialize, Serialize};

/// One conversational thread, normalized from a transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub project: String,
    pub started_at: i64,
    pub last_activity_at: i64,
    pub message_count: i64,
    pub preview: String,
    pub title: Option<String>,
    pub last_indexed: Option<i64>,
    pub is_automatic: bool,
    pub is_unread: bool,
    pub is_hidden: bool,
}

/// One turn within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub uuid: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A session as produced by the parser, before a session id is assigned
/// to it by the indexer (the parser discovers this from transcript content).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedSession {
    pub session_id: Option<String>,
    pub project: Option<String>,
    pub started_at: Option<i64>,
    pub last_activity_at: Option<i64>,
    pub preview: String,
    pub is_automatic: bool,
    pub messages: Vec<Message>,
}

/// Watermark recorded per external heartbeat work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatState {
    pub key: String,
    pub last_changed: Option<String>,
    pub last_processed: Option<i64>,
}

/// Listing filter for `listRecentSessions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionFilter {
    #[default]
    All,
    ManualOnly,
    AutomaticOnly,
}

/// Sort order for `searchMessages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Relevance,
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListResponse {
    pub sessions: Vec<Session>,
    pub pagination: Pagination,
}

/// One search hit: a matching message plus its owning session's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub session_id: String,
    pub session_started_at: i64,
    pub message_uuid: String,
    pub role: Role,
    pub highlighted_content: String,
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub pagination: Pagination,
    pub query: String,
    pub sort: SearchSort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub session_count: i64,
    pub message_count: i64,
    pub database_size_bytes: i64,
}

// ── Config ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    pub working_directory: String,
    pub max_items: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 300_000,
            working_directory: String::new(),
            max_items: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    pub allowed_working_dirs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestLogLevel {
    All,
    ErrorsOnly,
    Off,
}

impl Default for RequestLogLevel {
    fn default() -> Self {
        Self::ErrorsOnly
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub request_log_level: RequestLogLevel,
}

/// The single JSON config document. `apiKeyHash`/`apiKeyCreatedAt` are never
/// surfaced through `getAllEditableSections` but survive every `updateSection`
/// round-trip untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    pub heartbeat: HeartbeatConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
    pub api_key_hash: Option<String>,
    pub api_key_created_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Unrecognized top-level keys, preserved verbatim across updates.
    #[serde(flatten)]
    pub extra: std::collections::BTreeMap<String, serde_json::Value>,
}

/// The closed set of section names `ConfigService` will validate and patch.
pub const EDITABLE_SECTIONS: &[&str] = &["heartbeat", "security", "logging"];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown config section: {0}")]
    UnknownSection(String),
    #[error("unknown field '{field}' in section '{section}'")]
    UnknownField { section: String, field: String },
    #[error("invalid value for '{field}' in section '{section}': {reason}")]
    InvalidValue {
        section: String,
        field: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trips_camel_case() {
        let s = Session {
            id: "abc".into(),
            project: "/tmp/demo".into(),
            started_at: 1000,
            last_activity_at: 2000,
            message_count: 2,
            preview: "hi".into(),
            title: None,
            last_indexed: Some(3000),
            is_automatic: false,
            is_unread: true,
            is_hidden: false,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["startedAt"], 1000);
        assert_eq!(json["isUnread"], true);
        let back: Session = serde_json::from_value(json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn config_document_preserves_unknown_keys() {
        let json = serde_json::json!({
            "heartbeat": {"enabled": false, "intervalMs": 300000, "workingDirectory": "", "maxItems": 0},
            "security": {"allowedWorkingDirs": []},
            "logging": {"requestLogLevel": "errors-only"},
            "apiKeyHash": null,
            "apiKeyCreatedAt": null,
            "futureField": "kept"
        });
        let doc: ConfigDocument = serde_json::from_value(json).unwrap();
        assert_eq!(
            doc.extra.get("futureField"),
            Some(&serde_json::Value::String("kept".into()))
        );
        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["futureField"], "kept");
    }

    #[test]
    fn request_log_level_serializes_kebab_case() {
        let json = serde_json::to_value(RequestLogLevel::ErrorsOnly).unwrap();
        assert_eq!(json, "errors-only");
    }
}
