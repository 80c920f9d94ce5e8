//! Spawns one agent subprocess per live interaction, parses its
//! line-delimited JSON stdout, and exposes the result as an event channel.
//! Grounded on the teacher's `claude_cli.rs` spawn/stream idiom, generalized
//! from a one-shot classifier call to a long-lived streamed session.

use std::process::Stdio;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// One event out of a running executor. At most one `Complete` is ever sent,
/// and nothing follows it.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// One complete stdout line, parsed as JSON.
    Message(serde_json::Value),
    /// A stderr chunk, or a stdout line that failed to parse as JSON.
    Error(String),
    Complete { exit_code: i32 },
}

pub struct StartOptions {
    pub prompt: String,
    pub working_dir: String,
    pub resume_session_id: Option<String>,
}

/// Supervises one subprocess. `start` may only be called once; subsequent
/// calls are a programmer error in the caller (enforced by SessionStore,
/// which creates a fresh executor per session id).
pub struct SessionExecutor {
    session_id: String,
    pid: std::sync::Mutex<Option<i32>>,
}

impl SessionExecutor {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            pid: std::sync::Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Spawns the agent binary and returns a channel of its events. The
    /// returned receiver yields events in stdout order; stderr chunks are
    /// interleaved as they arrive.
    pub fn start(&self, opts: StartOptions) -> mpsc::Receiver<ExecutorEvent> {
        let (tx, rx) = mpsc::channel(256);

        let mut args: Vec<String> = Vec::new();
        if let Some(resume) = &opts.resume_session_id {
            args.push("--resume".into());
            args.push(resume.clone());
        }
        args.push("-p".into());
        args.push(opts.prompt.clone());
        args.push("--output-format".into());
        args.push("stream-json".into());
        args.push("--verbose".into());
        args.push("--dangerously-skip-permissions".into());

        let known_vars = ["CLAUDECODE", "CLAUDE_CODE_SSE_PORT", "CLAUDE_CODE_ENTRYPOINT"];
        let extra_vars: Vec<String> = std::env::vars()
            .filter(|(k, _)| k.starts_with("CLAUDE") && !known_vars.contains(&k.as_str()))
            .map(|(k, _)| k)
            .collect();

        let mut cmd = Command::new(resolved_agent_binary());
        cmd.args(&args)
            .current_dir(&opts.working_dir)
            .env("CI", "1")
            .env("TERM", "dumb")
            .env("NO_COLOR", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for var in known_vars.iter().chain(extra_vars.iter().map(|s| s.as_str())) {
            cmd.env_remove(var);
        }

        let session_id = self.session_id.clone();
        let child = cmd.spawn();

        let pid_slot = &self.pid;
        let mut child: Child = match child {
            Ok(child) => child,
            Err(e) => {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = tx
                        .send(ExecutorEvent::Error(format!("failed to spawn agent: {e}")))
                        .await;
                    let _ = tx.send(ExecutorEvent::Complete { exit_code: -1 }).await;
                });
                return rx;
            }
        };
        if let Some(pid) = child.id() {
            *pid_slot.lock().expect("pid lock poisoned") = Some(pid as i32);
        }

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        tokio::spawn(async move {
            let stdout_tx = tx.clone();
            let stdout_task = tokio::spawn(async move {
                let mut reader = BufReader::new(stdout);
                let mut buffer = String::new();
                loop {
                    buffer.clear();
                    match reader.read_line(&mut buffer).await {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = buffer.trim_end_matches('\n');
                            if line.is_empty() {
                                continue;
                            }
                            let event = match serde_json::from_str::<serde_json::Value>(line) {
                                Ok(value) => ExecutorEvent::Message(value),
                                Err(_) => ExecutorEvent::Error(line.to_string()),
                            };
                            if stdout_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = stdout_tx
                                .send(ExecutorEvent::Error(format!("stdout read error: {e}")))
                                .await;
                            break;
                        }
                    }
                }
            });

            let stderr_tx = tx.clone();
            let stderr_task = tokio::spawn(async move {
                let mut reader = tokio::io::BufReader::new(stderr);
                let mut chunk = [0u8; 4096];
                loop {
                    match reader.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            let text = String::from_utf8_lossy(&chunk[..n]).into_owned();
                            if stderr_tx.send(ExecutorEvent::Error(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });

            let _ = stdout_task.await;
            let _ = stderr_task.await;

            let status = child.wait().await;
            let exit_code = match status {
                Ok(status) => status.code().unwrap_or(-1),
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "executor: failed to wait for child");
                    -1
                }
            };
            let _ = tx.send(ExecutorEvent::Complete { exit_code }).await;
        });

        rx
    }

    /// Sends SIGTERM if the child has started and not yet exited. Idempotent:
    /// a second call is a harmless no-op if the process already reaped. Does
    /// not synthesize a `Complete` event — the OS exit produces that.
    pub fn cancel(&self) {
        let pid = *self.pid.lock().expect("pid lock poisoned");
        if let Some(pid) = pid {
            if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
                tracing::debug!(pid, error = %e, "executor: SIGTERM failed (process likely already exited)");
            }
        }
    }
}

fn resolved_agent_binary() -> &'static str {
    "claude"
}
