//! In-memory ring buffer of recent `ERROR`/`WARN` log events, plus process
//! uptime. Feeds the `/diagnostics` snapshot; never persisted.
//!
//! The ring is populated by [`DiagnosticsLayer`], a `tracing_subscriber`
//! `Layer` installed on the global subscriber in the composition root, so
//! every error site in the process — request handling, the indexer, the
//! file watcher, the heartbeat scheduler, panicking background tasks —
//! reaches `/diagnostics` without each call site needing to know about
//! `Diagnostics` directly. Grounded on the teacher's `tracing-subscriber`
//! `registry()` composition pattern, adding a small custom `Layer`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const RING_CAPACITY: usize = 50;

/// One captured `ERROR`/`WARN` tracing event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub timestamp_ms: i64,
    pub level: String,
    pub message: String,
}

/// Shared ring buffer handle: the subscriber-layer writer and the
/// `Diagnostics` reader both hold a clone of the same `Arc`.
pub type ErrorRing = Arc<Mutex<VecDeque<ErrorEntry>>>;

pub fn new_ring() -> ErrorRing {
    Arc::new(Mutex::new(VecDeque::with_capacity(RING_CAPACITY)))
}

pub struct Diagnostics {
    start_time: Instant,
    errors: ErrorRing,
}

impl Diagnostics {
    /// Standalone ring, not wired to any subscriber. Used by tests and by
    /// any `AppState` constructed outside the composition root.
    pub fn new() -> Self {
        Self::with_ring(new_ring())
    }

    /// Shares `ring` with a [`DiagnosticsLayer`] installed on the global
    /// subscriber, so entries logged anywhere in the process show up here.
    pub fn with_ring(ring: ErrorRing) -> Self {
        Self {
            start_time: Instant::now(),
            errors: ring,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn recent_errors(&self) -> Vec<ErrorEntry> {
        self.errors.lock().expect("diagnostics lock poisoned").iter().cloned().collect()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

/// Pushes every `ERROR`/`WARN` tracing event into a bounded ring, dropping
/// the oldest entry once full.
pub struct DiagnosticsLayer {
    ring: ErrorRing,
}

impl DiagnosticsLayer {
    pub fn new(ring: ErrorRing) -> Self {
        Self { ring }
    }
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level != tracing::Level::ERROR && level != tracing::Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let mut ring = self.ring.lock().expect("diagnostics lock poisoned");
        if ring.len() >= RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(ErrorEntry {
            timestamp_ms: now_millis(),
            level: level.to_string(),
            message: visitor.into_message(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if let Some(message) = self.message {
            return message;
        }
        self.fields
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.push((field.name().to_string(), rendered));
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
