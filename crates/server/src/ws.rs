//! `/ws` — the single websocket endpoint multiplexing session lifecycle
//! events over one connection per client. Grounded on the teacher's
//! `routes/terminal.rs`: upgrade handler, `ConnectionGuard` RAII pattern for
//! reliable cleanup, and a `tokio::select!` loop mixing child output,
//! client messages, and a protocol-level ping.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::Notify;

use crate::auth::AuthGate;
use crate::executor::{ExecutorEvent, StartOptions};
use crate::state::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MISSED_PONG_LIMIT: u32 = 2;
/// Per-client outgoing frame buffer. A full buffer means the client isn't
/// draining fast enough; per SPEC_FULL §5 the server disconnects rather than
/// applying backpressure that would stall the forwarding task.
const SEND_BUFFER_CAPACITY: usize = 32;

#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    #[serde(rename = "apiKey")]
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    id: Option<String>,
    payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStartPayload {
    session_id: String,
    prompt: String,
    working_dir: String,
    resume_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCancelPayload {
    session_id: String,
}

#[derive(Debug, Serialize)]
struct OutEnvelope<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

fn out(kind: &str, id: Option<&str>, payload: serde_json::Value) -> Message {
    Message::Text(
        serde_json::to_string(&OutEnvelope { kind, id, payload: Some(payload) })
            .expect("envelope always serializes")
            .into(),
    )
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(configured_hash) = AuthGate::required_hash(&state.config) {
        let allowed = query
            .api_key
            .as_deref()
            .map(|key| AuthGate::verify(key, &configured_hash))
            .unwrap_or(false);
        if !allowed {
            return ws.on_upgrade(|mut socket| async move {
                let _ = socket
                    .send(out("session.error", None, serde_json::json!({"error": "unauthorized"})))
                    .await;
                let _ = socket.send(Message::Close(None)).await;
            });
        }
    }

    ws.on_upgrade(move |socket| handle_client(socket, state))
}

/// RAII guard ensuring `removeByClient` always runs, even if the handler
/// returns early or the task is cancelled during shutdown.
struct ClientGuard {
    client_id: String,
    state: Arc<AppState>,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.state.session_store.remove_by_client(&self.client_id);
        self.state.ws_client_count.fetch_sub(1, Ordering::Relaxed);
    }
}

async fn handle_client(mut socket: WebSocket, state: Arc<AppState>) {
    let client_id = uuid_v4_like();
    state.ws_client_count.fetch_add(1, Ordering::Relaxed);
    let _guard = ClientGuard { client_id: client_id.clone(), state: state.clone() };

    if socket
        .send(out("auth_result", None, serde_json::json!({"success": true})))
        .await
        .is_err()
    {
        return;
    }

    let (out_tx, mut out_rx) = tokio::sync::mpsc::channel::<Message>(SEND_BUFFER_CAPACITY);
    let disconnect = Arc::new(Notify::new());
    let mut missed_pongs: u32 = 0;
    let mut ping_tick = tokio::time::interval(PING_INTERVAL);
    ping_tick.tick().await;

    loop {
        tokio::select! {
            forwarded = out_rx.recv() => {
                match forwarded {
                    Some(message) => {
                        if socket.send(message).await.is_err() {
                            return;
                        }
                    }
                    None => {}
                }
            }
            client_msg = socket.recv() => {
                match client_msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_message(&text, &client_id, &state, out_tx.clone(), disconnect.clone()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        missed_pongs = 0;
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Err(_)) => return,
                    _ => {}
                }
            }
            _ = ping_tick.tick() => {
                if missed_pongs >= MISSED_PONG_LIMIT {
                    tracing::debug!(client_id = %client_id, "ws: missed pong limit reached, disconnecting");
                    return;
                }
                missed_pongs += 1;
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
            _ = disconnect.notified() => {
                tracing::debug!(client_id = %client_id, "ws: send buffer full, disconnecting slow consumer");
                return;
            }
        }
    }
}

/// Forwards `message` without blocking; a full buffer means the client isn't
/// draining fast enough, so we signal disconnect instead of stalling the
/// caller (which may be the executor-event forwarding task).
fn try_forward(out_tx: &tokio::sync::mpsc::Sender<Message>, disconnect: &Notify, message: Message) {
    if let Err(TrySendError::Full(_)) = out_tx.try_send(message) {
        disconnect.notify_one();
    }
}

async fn handle_text_message(
    text: &str,
    client_id: &str,
    state: &Arc<AppState>,
    out_tx: tokio::sync::mpsc::Sender<Message>,
    disconnect: Arc<Notify>,
) {
    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return;
    };

    match envelope.kind.as_str() {
        "ping" => {
            try_forward(&out_tx, &disconnect, out("pong", envelope.id.as_deref(), serde_json::json!({})));
        }
        "session.start" => start_session(envelope, client_id, state, out_tx, disconnect, false).await,
        "session.resume" => start_session(envelope, client_id, state, out_tx, disconnect, true).await,
        "session.cancel" => cancel_session(envelope, state).await,
        _ => {
            tracing::debug!(kind = %envelope.kind, "ws: unknown message type, ignoring");
        }
    }
}

async fn start_session(
    envelope: Envelope,
    client_id: &str,
    state: &Arc<AppState>,
    out_tx: tokio::sync::mpsc::Sender<Message>,
    disconnect: Arc<Notify>,
    is_resume: bool,
) {
    let Some(payload) = envelope.payload else { return };
    let parsed: Result<SessionStartPayload, _> = serde_json::from_value(payload);
    let Ok(payload) = parsed else { return };

    if let Err(e) = state.validator.validate(&payload.working_dir) {
        try_forward(
            &out_tx,
            &disconnect,
            out(
                "session.error",
                None,
                serde_json::json!({"sessionId": payload.session_id, "error": e.to_string()}),
            ),
        );
        return;
    }

    let executor = state.session_store.create(&payload.session_id, client_id);
    let resume_session_id = if is_resume {
        payload.resume_session_id
    } else {
        None
    };
    let mut events = executor.start(StartOptions {
        prompt: payload.prompt,
        working_dir: payload.working_dir,
        resume_session_id,
    });

    let session_id = payload.session_id.clone();
    let session_store = state.session_store.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ExecutorEvent::Message(message) => {
                    try_forward(
                        &out_tx,
                        &disconnect,
                        out(
                            "session.output",
                            None,
                            serde_json::json!({"sessionId": session_id, "message": message}),
                        ),
                    );
                }
                ExecutorEvent::Error(error) => {
                    try_forward(
                        &out_tx,
                        &disconnect,
                        out(
                            "session.error",
                            None,
                            serde_json::json!({"sessionId": session_id, "error": error}),
                        ),
                    );
                }
                ExecutorEvent::Complete { exit_code } => {
                    try_forward(
                        &out_tx,
                        &disconnect,
                        out(
                            "session.complete",
                            None,
                            serde_json::json!({"sessionId": session_id, "exitCode": exit_code}),
                        ),
                    );
                    session_store.remove(&session_id);
                    break;
                }
            }
        }
    });
}

async fn cancel_session(envelope: Envelope, state: &Arc<AppState>) {
    let Some(payload) = envelope.payload else { return };
    let Ok(payload) = serde_json::from_value::<SessionCancelPayload>(payload) else { return };
    if let Some(executor) = state.session_store.get(&payload.session_id) {
        executor.cancel();
    }
}

/// Cheap client-id generator. Not a UUID implementation — collisions would
/// only merge two clients' session ownership, which is already guarded by
/// session ids being unique per `session.start` call.
fn uuid_v4_like() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or(0);
    format!("client-{nanos:x}")
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_serde() {
        let raw = r#"{"type":"session.cancel","id":"1","payload":{"sessionId":"abc"}}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "session.cancel");
        assert_eq!(envelope.id.as_deref(), Some("1"));
    }

    #[test]
    fn unknown_envelope_type_parses_without_error() {
        let raw = r#"{"type":"something.else"}"#;
        let envelope: Envelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.kind, "something.else");
        assert!(envelope.payload.is_none());
    }

    #[tokio::test]
    async fn full_send_buffer_triggers_disconnect_instead_of_blocking() {
        let (out_tx, _out_rx) = tokio::sync::mpsc::channel::<Message>(SEND_BUFFER_CAPACITY);
        let disconnect = Notify::new();

        for _ in 0..SEND_BUFFER_CAPACITY {
            try_forward(&out_tx, &disconnect, Message::Text("x".into()));
        }

        // Buffer is now full and nobody is draining it; one more send must not
        // block and must signal disconnect rather than wait for room.
        let notified = disconnect.notified();
        try_forward(&out_tx, &disconnect, Message::Text("overflow".into()));
        tokio::time::timeout(Duration::from_millis(50), notified)
            .await
            .expect("disconnect should be signalled once the buffer is full");
    }
}
