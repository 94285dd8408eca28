//! Structured application errors with a stable HTTP mapping.
//!
//! Every error surfaced to an API handler funnels through [`AppError`] so
//! the wire payload is always `{ "error": ..., "status_code": ... }`,
//! regardless of which layer (store, engine, bus) raised it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("mission_id already exists: {0}")]
    DuplicateMission(String),

    #[error("insufficient observations for triangulation")]
    InsufficientObservations,

    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DuplicateMission(_) => StatusCode::CONFLICT,
            AppError::InsufficientObservations => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::EngineUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, %status, "request rejected");
        }
        let body = json!({
            "error": self.to_string(),
            "status_code": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return AppError::DuplicateMission(db_err.message().to_string());
            }
        }
        if matches!(err, sqlx::Error::RowNotFound) {
            return AppError::NotFound("record not found".to_string());
        }
        AppError::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
