//! Shared application state handed to every route handler, grounded on the
//! teacher's `AppState` shape: one struct of `Arc`-wrapped sub-services
//! built once at startup and cloned cheaply per request.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::RwLock;

use claude_history_core::WorkingDirValidator;
use claude_history_db::Database;

use crate::config::ConfigService;
use crate::diagnostics::Diagnostics;
use crate::file_watcher::FileWatcher;
use crate::heartbeat::HeartbeatService;
use crate::indexer::{IndexResult, Indexer};
use crate::session_store::SessionStore;

pub struct AppState {
    pub db: Database,
    pub config: Arc<ConfigService>,
    pub validator: Arc<WorkingDirValidator>,
    pub indexer: Arc<Indexer>,
    pub session_store: Arc<SessionStore>,
    pub heartbeat: Arc<HeartbeatService>,
    pub diagnostics: Arc<Diagnostics>,
    pub file_watcher: RwLock<Option<FileWatcher>>,
    pub last_index_result: RwLock<IndexResult>,
    pub ws_client_count: std::sync::atomic::AtomicU64,
    start_time: Instant,
}

impl AppState {
    /// Builds state with a standalone diagnostics ring, not wired to the
    /// process-wide tracing subscriber. Used by tests and anywhere a full
    /// composition root isn't being built.
    pub fn new(db: Database, config: Arc<ConfigService>, transcript_root: PathBuf) -> Arc<Self> {
        Self::new_with_diagnostics(db, config, transcript_root, Arc::new(Diagnostics::new()))
    }

    /// Builds state sharing `diagnostics`' ring buffer with the composition
    /// root's `DiagnosticsLayer`, so background-task and subsystem errors
    /// logged anywhere in the process reach `/diagnostics`.
    pub fn new_with_diagnostics(
        db: Database,
        config: Arc<ConfigService>,
        transcript_root: PathBuf,
        diagnostics: Arc<Diagnostics>,
    ) -> Arc<Self> {
        let allowed = config.document().security.allowed_working_dirs;
        let validator = Arc::new(WorkingDirValidator::new(allowed));
        let indexer = Arc::new(Indexer::new(db.clone(), transcript_root));
        let heartbeat = Arc::new(HeartbeatService::new(db.clone(), config.clone()));

        Arc::new(Self {
            db,
            config,
            validator,
            indexer,
            session_store: Arc::new(SessionStore::new()),
            heartbeat,
            diagnostics,
            file_watcher: RwLock::new(None),
            last_index_result: RwLock::new(IndexResult::default()),
            ws_client_count: std::sync::atomic::AtomicU64::new(0),
            start_time: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Wires `ConfigService`'s hot-reload callback to the knobs that need to
    /// rebind on change: the validator's allowlist and the heartbeat
    /// scheduler's interval.
    pub fn install_config_hot_reload(self: &Arc<Self>) {
        let state = self.clone();
        self.config.set_on_changed(move |section| match section {
            "security" => {
                let dirs = state.config.document().security.allowed_working_dirs;
                state.validator.set_allowed_dirs(dirs);
            }
            "heartbeat" => {
                let state = state.clone();
                let handle = tokio::spawn(async move {
                    state.heartbeat.start_scheduler().await;
                });
                tokio::spawn(async move {
                    if let Err(e) = handle.await {
                        tracing::error!(error = %e, "heartbeat restart task panicked");
                    }
                });
            }
            _ => {}
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(ConfigService::load(dir.path().join("config.json")).await.unwrap());
        AppState::new(db, config, dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn uptime_increases_monotonically() {
        let state = state().await;
        let first = state.uptime_secs();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(state.uptime_secs() >= first);
    }

    #[tokio::test]
    async fn security_hot_reload_rebinds_validator_allowlist() {
        let state = state().await;
        state.install_config_hot_reload();
        let dir = tempfile::tempdir().unwrap();
        state
            .config
            .update_section(
                "security",
                serde_json::json!({"allowedWorkingDirs": [dir.path().to_string_lossy()]}),
            )
            .await
            .unwrap();
        assert!(state.validator.validate(&dir.path().to_string_lossy()).is_ok());
    }
}
