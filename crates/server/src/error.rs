use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use claude_history_core::{DiscoveryError, ParseError, ValidatorError};
use claude_history_db::DbError;
use claude_history_types::ConfigError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

/// Maps onto the §7 status table: 400/404/401/500/500/500/403/502/503.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("io error: {0}")]
    Parse(#[from] ParseError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("working directory not allowed: {0}")]
    Validator(#[from] ValidatorError),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidInput(msg) => {
                tracing::warn!(message = %msg, "invalid input");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            ApiError::NotFound(msg) => {
                tracing::debug!(message = %msg, "not found");
                (StatusCode::NOT_FOUND, msg.clone())
            }
            ApiError::AuthRequired => (StatusCode::UNAUTHORIZED, "authentication required".into()),
            ApiError::Db(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database error".into())
            }
            ApiError::Parse(e) => {
                tracing::error!(error = %e, "parse error");
                (StatusCode::INTERNAL_SERVER_ERROR, "parse error".into())
            }
            ApiError::Discovery(e) => {
                tracing::error!(error = %e, "discovery error");
                (StatusCode::INTERNAL_SERVER_ERROR, "discovery error".into())
            }
            ApiError::Validator(e) => (StatusCode::FORBIDDEN, e.to_string()),
            ApiError::Upstream(msg) => {
                tracing::warn!(message = %msg, "upstream error");
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::Config(e) => (StatusCode::BAD_REQUEST, e.to_string()),
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn status_and_body(err: ApiError) -> (StatusCode, ErrorResponse) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn not_found_maps_to_404() {
        let (status, body) = status_and_body(ApiError::NotFound("session abc".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "session abc");
    }

    #[tokio::test]
    async fn auth_required_maps_to_401() {
        let (status, _) = status_and_body(ApiError::AuthRequired).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validator_error_maps_to_403() {
        let (status, _) = status_and_body(ApiError::Validator(ValidatorError::EmptyAllowlist)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upstream_error_maps_to_502() {
        let (status, _) = status_and_body(ApiError::Upstream("work-item source down".into())).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn unavailable_maps_to_503() {
        let (status, _) = status_and_body(ApiError::Unavailable("heartbeat disabled".into())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
