//! Periodic poller that diffs an external work-item source against
//! persisted watermarks and spawns one detached agent run per changed item.
//! Spawn idiom grounded on `executor.rs` (itself grounded on the teacher's
//! `claude_cli.rs`); scheduling grounded on the teacher's `startScheduler`-
//! style periodic task pattern (a `tokio::time::interval` owned by a handle
//! that can be dropped/replaced on config hot-reload).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, RwLock};

use claude_history_db::Database;

const HEARTBEAT_MARKER: &str = "<!-- HEARTBEAT_SESSION -->";
const HEARTBEAT_PREFIX: &str = "[Heartbeat]";

/// One `- [x] description` / `- [ ] description` line under a `## Section`
/// heading in `HEARTBEAT.md`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatTask {
    pub section: String,
    pub description: String,
    pub enabled: bool,
}

/// Parses the checklist. Unrecognized lines are ignored; there is no error
/// path — a missing or empty file simply yields no tasks.
pub fn parse_checklist(contents: &str) -> Vec<HeartbeatTask> {
    let mut tasks = Vec::new();
    let mut section = String::new();
    for line in contents.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("## ") {
            section = heading.trim().to_string();
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("- [x] ") {
            tasks.push(HeartbeatTask {
                section: section.clone(),
                description: rest.trim().to_string(),
                enabled: true,
            });
        } else if let Some(rest) = trimmed.strip_prefix("- [ ] ") {
            tasks.push(HeartbeatTask {
                section: section.clone(),
                description: rest.trim().to_string(),
                enabled: false,
            });
        }
    }
    tasks
}

#[derive(Debug, Clone, Deserialize)]
struct WorkItemFields {
    #[serde(rename = "System.ChangedDate")]
    changed_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkItem {
    id: serde_json::Value,
    fields: WorkItemFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeKind {
    New,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRunResult {
    pub tasks_processed: u64,
    pub sessions_created: u64,
    pub session_ids: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatStatus {
    pub enabled: bool,
    pub interval_ms: u64,
    pub working_directory: String,
    pub watermarks: Vec<claude_history_types::HeartbeatState>,
}

pub struct HeartbeatService {
    db: Database,
    config: Arc<crate::config::ConfigService>,
    scheduler_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    check_command: RwLock<Option<String>>,
}

impl HeartbeatService {
    pub fn new(db: Database, config: Arc<crate::config::ConfigService>) -> Self {
        Self {
            db,
            config,
            scheduler_handle: Mutex::new(None),
            check_command: RwLock::new(std::env::var("HEARTBEAT_CHECK_COMMAND").ok()),
        }
    }

    pub async fn status(&self) -> HeartbeatStatus {
        let cfg = self.config.document().heartbeat;
        let watermarks = self.db.get_all_heartbeat_state().await.unwrap_or_default();
        HeartbeatStatus {
            enabled: cfg.enabled,
            interval_ms: cfg.interval_ms,
            working_directory: cfg.working_directory,
            watermarks,
        }
    }

    /// Runs one pass. Returns immediately with an empty result if the
    /// service is disabled and `force` is false.
    pub async fn run_heartbeat(self: &Arc<Self>, force: bool) -> HeartbeatRunResult {
        let cfg = self.config.document().heartbeat;
        if !cfg.enabled && !force {
            return HeartbeatRunResult::default();
        }

        let mut result = HeartbeatRunResult::default();
        let checklist_path = PathBuf::from(&cfg.working_directory).join("HEARTBEAT.md");
        let contents = match tokio::fs::read_to_string(&checklist_path).await {
            Ok(c) => c,
            Err(e) => {
                result.errors.push(format!("failed to read HEARTBEAT.md: {e}"));
                return result;
            }
        };

        let tasks: Vec<_> = parse_checklist(&contents).into_iter().filter(|t| t.enabled).collect();
        let max_items = cfg.max_items;

        'tasks: for task in &tasks {
            result.tasks_processed += 1;
            match self.check_for_changes(&task.description).await {
                Ok(items) => {
                    for (key, changed_date) in items {
                        if max_items > 0 && result.sessions_created >= max_items {
                            break 'tasks;
                        }
                        match self.run_claude_analysis(&task.description, &cfg.working_directory).await {
                            Ok(session_id) => {
                                result.sessions_created += 1;
                                result.session_ids.push(session_id);
                            }
                            Err(e) => {
                                result.errors.push(format!("{key}: spawn failed: {e}"));
                                continue;
                            }
                        }
                        let now = std::time::SystemTime::now()
                            .duration_since(std::time::UNIX_EPOCH)
                            .map(|d| d.as_millis() as i64)
                            .unwrap_or(0);
                        if let Err(e) = self
                            .db
                            .upsert_heartbeat_state(&key, changed_date.as_deref(), now)
                            .await
                        {
                            // Persist failures never revert the spawn that
                            // already happened.
                            result.errors.push(format!("{key}: failed to persist watermark: {e}"));
                        }
                    }
                }
                Err(e) => result.errors.push(e),
            }
        }

        result
    }

    /// Invokes the configured external command, classifying each returned
    /// item as new/updated/unchanged against persisted state. Returns only
    /// the items requiring action, as `(watermark key, new changed-date)`.
    async fn check_for_changes(&self, task_key: &str) -> Result<Vec<(String, Option<String>)>, String> {
        let Some(command) = self.check_command.read().await.clone() else {
            return Ok(Vec::new());
        };

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .output()
            .await
            .map_err(|e| format!("{task_key}: failed to run work-item source: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("{task_key}: work-item source exited non-zero: {stderr}"));
        }

        let items: Vec<WorkItem> = serde_json::from_slice(&output.stdout)
            .map_err(|e| format!("{task_key}: malformed work-item JSON: {e}"))?;

        let mut changed = Vec::new();
        for item in items {
            let id = item
                .id
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| item.id.to_string());
            let key = format!("workitem:{id}");
            let changed_date = item.fields.changed_date;
            let existing = self
                .db
                .get_heartbeat_state(&key)
                .await
                .map_err(|e| format!("{key}: store lookup failed: {e}"))?;

            let kind = match existing {
                None => ChangeKind::New,
                Some(state) if state.last_changed != changed_date => ChangeKind::Updated,
                Some(_) => ChangeKind::Unchanged,
            };
            if kind != ChangeKind::Unchanged {
                changed.push((key, changed_date));
            }
        }
        Ok(changed)
    }

    /// Spawns the agent binary detached, reads only the first stdout line
    /// (the `init` JSON carrying the agent-assigned session id), then lets
    /// the child continue running unref'd. The prompt is tagged so the
    /// eventual transcript is later classified as automatic by the parser.
    async fn run_claude_analysis(&self, task_description: &str, working_dir: &str) -> Result<String, String> {
        let prompt = format!("{HEARTBEAT_PREFIX} {task_description}\n{HEARTBEAT_MARKER}");

        let mut cmd = Command::new("claude");
        cmd.args([
            "-p",
            &prompt,
            "--output-format",
            "stream-json",
            "--verbose",
            "--dangerously-skip-permissions",
        ])
        .current_dir(working_dir)
        .env("CI", "1")
        .env("TERM", "dumb")
        .env("NO_COLOR", "1")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| format!("failed to spawn heartbeat analysis: {e}"))?;
        let stdout = child.stdout.take().ok_or("failed to capture stdout")?;
        let mut reader = BufReader::new(stdout);
        let mut first_line = String::new();
        reader
            .read_line(&mut first_line)
            .await
            .map_err(|e| format!("failed to read init line: {e}"))?;

        let init: serde_json::Value =
            serde_json::from_str(first_line.trim()).map_err(|e| format!("malformed init line: {e}"))?;
        let session_id = init
            .get("session_id")
            .or_else(|| init.get("sessionId"))
            .and_then(|v| v.as_str())
            .ok_or("init line missing session id")?
            .to_string();

        // The child is intentionally not waited on: it continues running
        // independently and is later picked up by the indexer/file watcher.
        std::mem::drop(child);

        Ok(session_id)
    }

    /// Starts the periodic tick. Replaces and aborts any previously running
    /// scheduler, so config hot-reload may call this again with a new
    /// interval.
    pub async fn start_scheduler(self: &Arc<Self>) {
        let service = self.clone();
        let interval_ms = self.config.document().heartbeat.interval_ms;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(interval_ms));
            tick.tick().await;
            loop {
                tick.tick().await;
                let _ = service.run_heartbeat(false).await;
            }
        });
        let mut slot = self.scheduler_handle.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
    }

    pub async fn stop_scheduler(&self) {
        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_checkbox_state() {
        let md = "## Code review\n- [x] Review open PRs\n- [ ] Triage backlog\n\n## Ops\n- [x] Check deploy health\n";
        let tasks = parse_checklist(md);
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[0].section, "Code review");
        assert!(tasks[0].enabled);
        assert!(!tasks[1].enabled);
        assert_eq!(tasks[2].section, "Ops");
    }

    #[test]
    fn ignores_unrelated_lines() {
        let md = "Some preamble\n## Section\nnot a checkbox\n- [x] real task\n";
        let tasks = parse_checklist(md);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].description, "real task");
    }

    #[tokio::test]
    async fn disabled_and_not_forced_is_a_noop() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            crate::config::ConfigService::load(dir.path().join("config.json"))
                .await
                .unwrap(),
        );
        let service = Arc::new(HeartbeatService::new(db, config));
        let result = service.run_heartbeat(false).await;
        assert_eq!(result.tasks_processed, 0);
        assert_eq!(result.sessions_created, 0);
    }

    #[tokio::test]
    async fn missing_checklist_file_is_recorded_as_an_error_when_forced() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(
            crate::config::ConfigService::load(dir.path().join("config.json"))
                .await
                .unwrap(),
        );
        config
            .update_section(
                "heartbeat",
                serde_json::json!({"workingDirectory": dir.path().to_string_lossy()}),
            )
            .await
            .unwrap();
        let service = Arc::new(HeartbeatService::new(db, config));
        let result = service.run_heartbeat(true).await;
        assert!(!result.errors.is_empty());
    }
}
