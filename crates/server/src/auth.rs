//! Constant-time shared-secret gate. Open if no key hash is configured.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use sha2::{Digest, Sha256};

use crate::config::ConfigService;
use crate::error::ApiError;
use crate::state::AppState;

pub struct AuthGate;

impl AuthGate {
    /// `None` means the request should be allowed regardless of key.
    /// `Some(hash)` is the configured SHA-256 hex digest to compare against.
    pub fn required_hash(config: &ConfigService) -> Option<String> {
        config.document().api_key_hash
    }

    /// Hash the supplied key and compare it in constant time against the
    /// configured digest.
    pub fn verify(supplied: &str, configured_hash: &str) -> bool {
        let digest = hex::encode(Sha256::digest(supplied.as_bytes()));
        constant_time_eq(digest.as_bytes(), configured_hash.as_bytes())
    }
}

/// Middleware applied to every HTTP route except `/health`. Reads the
/// `X-API-Key` header and compares it against the configured hash; open if
/// none is configured.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(configured_hash) = AuthGate::required_hash(&state.config) else {
        return Ok(next.run(request).await);
    };

    let supplied = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok());

    match supplied {
        Some(key) if AuthGate::verify(key, &configured_hash) => Ok(next.run(request).await),
        _ => Err(ApiError::AuthRequired),
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
