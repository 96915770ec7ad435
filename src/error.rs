use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::models::ErrorBody;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("counter store is not configured: {0}")]
    NotConfigured(String),

    #[error("counter store is unavailable: {0}")]
    Unavailable(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    // connectivity or timeout
    #[error("remote store request failed: {0}")]
    Http(#[from] reqwest::Error),

    // pipeline ran but the statement failed
    #[error("remote store rejected statement: {0}")]
    Remote(String),

    #[error("unexpected remote store response: {0}")]
    Protocol(String),

    #[error("stored view count is not a valid count: {0}")]
    InvalidCount(i64),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ViewError {
    #[error("slug is required")]
    MissingSlug,

    #[error("slug is malformed")]
    InvalidSlug,

    #[error("unknown content kind: {0}")]
    UnknownKind(String),

    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            Self::MissingSlug => (StatusCode::BAD_REQUEST, "Slug is required", None),
            Self::InvalidSlug => (StatusCode::BAD_REQUEST, "Invalid slug", None),
            Self::UnknownKind(_) => (StatusCode::NOT_FOUND, "Unknown content kind", None),
            Self::RateLimited { retry_after_secs } => {
                let body = ErrorBody {
                    error: "Rate limit exceeded".to_string(),
                    message: None,
                };
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(header::RETRY_AFTER, retry_after_secs.to_string())],
                    Json(body),
                )
                    .into_response();
            }
            // a view count is not sensitive, so the store message goes to the caller
            Self::Store(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                Some(err.to_string()),
            ),
        };

        let body = ErrorBody {
            error: error.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}
