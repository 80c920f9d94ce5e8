//! Streams one transcript file into a normalized [`ParsedSession`].
//!
//! One line is one JSON object; malformed lines are logged and skipped
//! rather than aborting the whole file, since a transcript is append-only
//! and may be observed mid-write by the file watcher.

use std::path::Path;

use claude_history_types::{Message, ParsedSession, Role};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::ParseError;

const PREVIEW_MAX_CHARS: usize = 200;
const HEARTBEAT_PREFIX: &str = "[Heartbeat]";
const HEARTBEAT_MARKER: &str = "<!-- HEARTBEAT_SESSION -->";

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "type")]
    entry_type: Option<String>,
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    cwd: Option<String>,
    #[serde(rename = "isMeta")]
    is_meta: Option<bool>,
    uuid: Option<String>,
    timestamp: Option<serde_json::Value>,
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[allow(dead_code)]
    role: Option<String>,
    content: Option<serde_json::Value>,
}

/// Parse one transcript file end to end, returning the normalized session.
///
/// `messages[].session_id` is left empty: the caller (the indexer) assigns
/// the canonical session id from the filename stem, which is authoritative
/// over whatever `sessionId` the transcript entries themselves recorded.
pub async fn parse_transcript_file(path: &Path) -> Result<ParsedSession, ParseError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ParseError::io(path, e))?;
    let mut lines = BufReader::new(file).lines();

    let mut out = ParsedSession::default();
    let mut preview_set = false;
    let mut first_message_content: Option<String> = None;
    let mut line_no = 0usize;

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| ParseError::io(path, e))?
    {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let entry: RawEntry = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(err) => {
                tracing::debug!(path = %path.display(), line = line_no, error = %err, "skipping malformed transcript line");
                continue;
            }
        };

        if out.session_id.is_none() {
            out.session_id = entry.session_id.clone();
        }
        if out.project.is_none() {
            out.project = entry.cwd.clone();
        }

        let role = match entry.entry_type.as_deref() {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => continue,
        };

        if entry.is_meta == Some(true) {
            continue;
        }

        let content = entry
            .message
            .as_ref()
            .and_then(|m| m.content.as_ref())
            .map(extract_text)
            .unwrap_or_default();
        if content.is_empty() {
            continue;
        }

        let timestamp = entry.timestamp.as_ref().and_then(parse_timestamp);
        if let Some(ts) = timestamp {
            out.started_at = Some(out.started_at.map_or(ts, |s| s.min(ts)));
            out.last_activity_at = Some(out.last_activity_at.map_or(ts, |l| l.max(ts)));
        }

        if first_message_content.is_none() {
            first_message_content = Some(content.clone());
        }

        if role == Role::User && !preview_set && !is_command_message(&content) {
            out.preview = truncate_preview(&content, PREVIEW_MAX_CHARS);
            preview_set = true;
        }

        out.messages.push(Message {
            uuid: entry.uuid.unwrap_or_default(),
            session_id: String::new(),
            role,
            content,
            timestamp,
        });
    }

    out.is_automatic = looks_automatic(&out.preview) || first_message_content
        .as_deref()
        .map(looks_automatic)
        .unwrap_or(false);

    Ok(out)
}

fn looks_automatic(content: &str) -> bool {
    content.starts_with(HEARTBEAT_PREFIX) || content.contains(HEARTBEAT_MARKER)
}

fn is_command_message(content: &str) -> bool {
    content.starts_with("<command-name>") || content.starts_with("<local-command")
}

fn truncate_preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// Extract plain text from either a string content field or an array of
/// typed content blocks, concatenating only `text`-typed blocks by newline.
fn extract_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}
