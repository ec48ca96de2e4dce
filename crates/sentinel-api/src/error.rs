//! Sentinel API error types and response envelopes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sentinel_core::error::{AppError, ErrorCode};
use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;

/// Startup errors for the API server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Handler registration does not cover the published topics.
    #[error("worker setup error: {0}")]
    Worker(#[from] sentinel_core::error::DomainError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// `{"success": true, "data": ...}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    success: bool,
    data: T,
}

/// Wraps `data` in the success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<Success<T>> {
    Json(Success {
        success: true,
        data,
    })
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    success: bool,
    error: &'a AppError,
}

/// HTTP-layer wrapper around `AppError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

/// HTTP status for a failure code.
#[must_use]
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCode::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorCode::InternalError | ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.code());
        let body = Failure {
            success: false,
            error: &self.0,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(code: ErrorCode) -> StatusCode {
        ApiError(AppError::new(code, "boom", "trace-1"))
            .into_response()
            .status()
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(status_of(ErrorCode::NotFound), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_already_exists_maps_to_409() {
        assert_eq!(status_of(ErrorCode::AlreadyExists), StatusCode::CONFLICT);
    }

    #[test]
    fn test_invalid_input_maps_to_400() {
        assert_eq!(status_of(ErrorCode::InvalidInput), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_guard_rejections_map_to_retryable_statuses() {
        assert_eq!(
            status_of(ErrorCode::TooManyRequests),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ErrorCode::ServiceUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(ErrorCode::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_internal_and_unknown_map_to_500() {
        assert_eq!(
            status_of(ErrorCode::InternalError),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ErrorCode::Unknown),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
