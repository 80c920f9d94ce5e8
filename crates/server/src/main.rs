//! `claude-history-server` binary. Composition root: wires config, store,
//! indexer, file watcher, and heartbeat into one HTTP + websocket listener.
//! Grounded on the teacher's `main.rs` startup sequence and tracing setup,
//! without its macOS-only platform gate (not applicable here).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;

use claude_history_core::paths;
use claude_history_db::Database;
use claude_history_server::config::ConfigService;
use claude_history_server::create_app;
use claude_history_server::diagnostics::{new_ring, Diagnostics, DiagnosticsLayer};
use claude_history_server::file_watcher::FileWatcher;
use claude_history_server::state::AppState;

const DEFAULT_PORT: u16 = 3847;
const REINDEX_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// `claude-history-server` command line arguments. Each flag overrides the
/// corresponding environment-variable default from `paths`.
#[derive(Parser, Debug)]
#[command(name = "claude-history-server")]
#[command(about = "Search and replay indexer for Claude Code session transcripts")]
struct Args {
    /// Port to listen on
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Directory holding config.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    /// Root directory of Claude Code project transcripts
    #[arg(long, value_name = "PATH")]
    transcript_root: Option<PathBuf>,
}

fn get_port(args: &Args) -> u16 {
    args.port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(DEFAULT_PORT)
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(panic = %info, "panic in background task");
        default_hook(info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let error_ring = new_ring();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .with(DiagnosticsLayer::new(error_ring.clone()))
        .init();

    install_panic_hook();

    let db_path = paths::default_db_path()?;
    let db = Database::new(&db_path).await?;

    let config_path = match &args.config_dir {
        Some(dir) => dir.join("config.json"),
        None => paths::default_config_path()?,
    };
    let config = Arc::new(ConfigService::load(config_path).await?);

    let transcript_root = match &args.transcript_root {
        Some(root) => root.clone(),
        None => paths::default_transcript_root()?,
    };
    let state = AppState::new_with_diagnostics(
        db,
        config,
        transcript_root.clone(),
        Arc::new(Diagnostics::with_ring(error_ring)),
    );
    state.install_config_hot_reload();

    tracing::info!("running initial index pass");
    let initial = state.indexer.run(false).await;
    *state.last_index_result.write().await = initial;
    tracing::info!(indexed = initial.indexed, skipped = initial.skipped, "initial index pass complete");

    match FileWatcher::start(&transcript_root, state.indexer.clone()) {
        Ok(watcher) => {
            *state.file_watcher.write().await = Some(watcher);
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to start file watcher, continuing without live reindex");
        }
    }

    {
        let state = state.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(REINDEX_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let result = state.indexer.run(false).await;
                *state.last_index_result.write().await = result;
                tracing::debug!(indexed = result.indexed, skipped = result.skipped, "periodic reindex complete");
            }
        });
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "periodic reindex task panicked");
            }
        });
    }

    if state.config.document().heartbeat.enabled {
        state.heartbeat.start_scheduler().await;
    }

    let app = create_app(state.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], get_port(&args)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "claude-history-server ready");

    let shutdown_state = state.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
            shutdown_state.heartbeat.stop_scheduler().await;
            for executor in shutdown_state.session_store.get_all() {
                executor.cancel();
            }
        })
        .await?;

    Ok(())
}
