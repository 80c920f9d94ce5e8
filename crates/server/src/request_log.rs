//! Structured request logging middleware with level control and
//! query-string redaction (an `apiKey` query param must never be logged).

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use claude_history_types::RequestLogLevel;

use crate::state::AppState;

fn redact_query(uri: &axum::http::Uri) -> String {
    let path = uri.path();
    match uri.query() {
        None => path.to_string(),
        Some(query) => {
            let redacted: Vec<String> = query
                .split('&')
                .map(|pair| match pair.split_once('=') {
                    Some((k, _)) if k == "apiKey" => format!("{k}=<redacted>"),
                    _ => pair.to_string(),
                })
                .collect();
            format!("{path}?{}", redacted.join("&"))
        }
    }
}

pub async fn log_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let level = state.config.document().logging.request_log_level;
    if level == RequestLogLevel::Off {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = redact_query(request.uri());
    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();
    let duration_ms = start.elapsed().as_millis();

    if level == RequestLogLevel::All || status.is_server_error() || status.is_client_error() {
        if status.is_server_error() {
            // Captured into `/diagnostics`' ring buffer by `DiagnosticsLayer`
            // on the global subscriber, not recorded here directly.
            tracing::error!(%method, path = %path, %status, duration_ms, "request failed");
        } else if status.is_client_error() {
            tracing::warn!(%method, path = %path, %status, duration_ms, "request rejected");
        } else {
            tracing::info!(%method, path = %path, %status, duration_ms, "request completed");
        }
    }

    response
}
