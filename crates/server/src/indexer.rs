//! Walks the transcript tree and drives the parser into the Store.
//! Indexing is serialized through `self.lock`: reads against the Store
//! proceed concurrently, but only one indexing pass runs at a time.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use claude_history_core::{discovery, parser};
use claude_history_db::{Database, IndexSessionParams};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct IndexResult {
    pub indexed: u64,
    pub skipped: u64,
}

pub struct Indexer {
    db: Database,
    transcript_root: PathBuf,
    lock: Mutex<()>,
}

impl Indexer {
    pub fn new(db: Database, transcript_root: PathBuf) -> Self {
        Self {
            db,
            transcript_root,
            lock: Mutex::new(()),
        }
    }

    pub fn transcript_root(&self) -> &Path {
        &self.transcript_root
    }

    /// Full pass over every project directory under the transcript root.
    pub async fn run(&self, force: bool) -> IndexResult {
        let _guard = self.lock.lock().await;

        let projects = match discovery::discover_projects(&self.transcript_root).await {
            Ok(projects) => projects,
            Err(e) => {
                tracing::warn!(error = %e, "indexer: failed to walk transcript root");
                return IndexResult::default();
            }
        };

        let mut result = IndexResult::default();
        for project_dir in projects {
            let files = match discovery::discover_transcript_files(&project_dir).await {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!(path = %project_dir.display(), error = %e, "indexer: failed to list project files");
                    continue;
                }
            };
            if files.is_empty() {
                continue;
            }
            let titles = discovery::load_title_map(&project_dir).await;
            for file in files {
                match self.index_file_locked(&file, &titles, force).await {
                    Ok(true) => result.indexed += 1,
                    Ok(false) => result.skipped += 1,
                    Err(e) => {
                        tracing::warn!(path = %file.display(), error = %e, "indexer: failed to index file");
                        result.skipped += 1;
                    }
                }
            }
        }
        result
    }

    /// Index a single file, taking the serialization lock itself. Used by
    /// the file watcher, which reacts to one path at a time.
    pub async fn index_one(&self, path: &Path) -> Result<bool, claude_history_core::ParseError> {
        let _guard = self.lock.lock().await;
        let project_dir = path.parent().unwrap_or(Path::new("."));
        let titles = discovery::load_title_map(project_dir).await;
        self.index_file_locked(path, &titles, false).await
    }

    /// Returns `Ok(true)` if the file was (re)indexed, `Ok(false)` if skipped.
    async fn index_file_locked(
        &self,
        path: &Path,
        titles: &std::collections::HashMap<String, String>,
        force: bool,
    ) -> Result<bool, claude_history_core::ParseError> {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return Ok(false);
        };
        if claude_history_core::discovery::is_skippable_stem(stem) {
            return Ok(false);
        }
        let session_id = stem.to_string();

        if !force {
            if let Some(last_indexed) = self.db.get_session_last_indexed(&session_id).await.ok().flatten() {
                if let Ok(modified) = file_modified_millis(path).await {
                    if modified <= last_indexed {
                        return Ok(false);
                    }
                }
            }
        }

        let parsed = parser::parse_transcript_file(path).await?;
        let Some(ref parsed_session_id) = parsed.session_id else {
            return Ok(false);
        };
        if parsed.messages.is_empty() {
            return Ok(false);
        }
        // The canonical session id is the filename stem, not whatever the
        // transcript's own sessionId field recorded.
        let _ = parsed_session_id;

        let now = now_millis();
        let messages: Vec<_> = parsed
            .messages
            .into_iter()
            .map(|m| claude_history_types::Message {
                session_id: session_id.clone(),
                ..m
            })
            .collect();

        let result = self
            .db
            .index_session(IndexSessionParams {
                session_id: &session_id,
                project: parsed.project.as_deref().unwrap_or(""),
                started_at: parsed.started_at.unwrap_or(now),
                last_activity_at: parsed.last_activity_at.unwrap_or(now),
                preview: &parsed.preview,
                title: titles.get(&session_id).map(|s| s.as_str()),
                is_automatic: parsed.is_automatic,
                last_indexed: now,
                messages: &messages,
            })
            .await;

        match result {
            Ok(()) => {
                if let Err(e) = self.db.mark_unread_if_new(&session_id).await {
                    tracing::warn!(error = %e, "indexer: failed to set unread flag");
                }
                Ok(true)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "indexer: store write failed");
                Ok(false)
            }
        }
    }
}

async fn file_modified_millis(path: &Path) -> std::io::Result<i64> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata.modified()?;
    let millis = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(millis)
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    async fn write_transcript(dir: &Path, project: &str, session: &str, lines: &[&str]) {
        let project_dir = dir.join(project);
        tokio::fs::create_dir_all(&project_dir).await.unwrap();
        let mut f = tokio::fs::File::create(project_dir.join(format!("{session}.jsonl")))
            .await
            .unwrap();
        for line in lines {
            f.write_all(line.as_bytes()).await.unwrap();
            f.write_all(b"\n").await.unwrap();
        }
    }

    #[tokio::test]
    async fn indexes_new_session_and_sets_message_count() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(
            dir.path(),
            "demo",
            "abc",
            &[
                r#"{"type":"user","cwd":"/tmp/demo","uuid":"u1","timestamp":1000,"message":{"content":"How do I create a React component?"}}"#,
                r#"{"type":"assistant","uuid":"a1","timestamp":2000,"message":{"content":"Use a function."}}"#,
            ],
        )
        .await;

        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.clone(), dir.path().to_path_buf());
        let result = indexer.run(false).await;
        assert_eq!(result.indexed, 1);
        assert_eq!(result.skipped, 0);

        let session = db.get_session_by_id("abc").await.unwrap().unwrap();
        assert_eq!(session.message_count, 2);
        assert_eq!(session.preview, "How do I create a React component?");
    }

    #[tokio::test]
    async fn reindex_of_unchanged_file_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(
            dir.path(),
            "demo",
            "abc",
            &[r#"{"type":"user","uuid":"u1","timestamp":1000,"message":{"content":"hi"}}"#],
        )
        .await;

        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.clone(), dir.path().to_path_buf());
        indexer.run(false).await;
        let second = indexer.run(false).await;
        assert_eq!(second.indexed, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn skips_agent_and_sessions_index_files() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(dir.path(), "demo", "agent-1", &[r#"{"type":"user","uuid":"u1","message":{"content":"hi"}}"#]).await;

        let db = Database::new_in_memory().await.unwrap();
        let indexer = Indexer::new(db.clone(), dir.path().to_path_buf());
        let result = indexer.run(false).await;
        assert_eq!(result.indexed, 0);
        assert_eq!(result.skipped, 0);
    }
}
