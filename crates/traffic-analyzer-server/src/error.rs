//! Single conversion point from internal errors to HTTP responses.
//!
//! Every handler returns `Result<_, AppError>`; the status-code mapping
//! lives here and nowhere else, the same "one typed error, one `IntoResponse`
//! impl" shape the teacher's CLI uses for its own exit-code mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    MissingResource(String),
    #[error("already in progress: {0}")]
    InProgress(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("authentication failed")]
    AuthFailed,
    #[error("upstream catalog rejected credentials")]
    NoCatalogAccess,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Storage(#[from] crate::storage::StorageError),
    #[error(transparent)]
    Catalog(#[from] crate::catalog_client::CatalogError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            AppError::MissingResource(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InProgress(_) => (StatusCode::PARTIAL_CONTENT, "in_progress"),
            AppError::Timeout(_) => (StatusCode::REQUEST_TIMEOUT, "timeout"),
            AppError::AuthFailed => (StatusCode::UNAUTHORIZED, "auth_failed"),
            AppError::NoCatalogAccess => (StatusCode::FAILED_DEPENDENCY, "no_catalog_access"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::Database(_) | AppError::Storage(_) | AppError::Catalog(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        tracing::error!(error = %self, %code, "request failed");
        let body = Json(json!({ "code": code, "message": self.to_string() }));
        (status, body).into_response()
    }
}
