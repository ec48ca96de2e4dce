//! HTTP routes.

pub mod breakers;
pub mod events;
pub mod health;
pub mod orgs;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use axum::middleware;
use sentinel_core::error::{AppError, ErrorCode};
use sentinel_core::trace;
use sentinel_resilience::executor::ExecuteOptions;

use crate::error::ApiError;
use crate::middleware::{caller_key, trace_id_middleware};
use crate::state::AppState;

/// Builds the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(breakers::router())
        .nest("/api/v1/events", events::router())
        .nest("/api/v1/orgs", orgs::router())
        .layer(middleware::from_fn(trace_id_middleware))
        .with_state(state)
}

/// Guard options for a request: rate limited by its caller key.
pub(crate) fn guard_options(headers: &HeaderMap) -> ExecuteOptions {
    ExecuteOptions::default().caller(caller_key(headers))
}

/// `INVALID_INPUT` carrying the ambient trace id.
pub(crate) fn invalid_input(message: impl Into<String>) -> ApiError {
    ApiError(AppError::new(
        ErrorCode::InvalidInput,
        message,
        trace::current_trace_id(),
    ))
}

/// Maps a malformed JSON body to `INVALID_INPUT`.
pub(crate) fn invalid_body(rejection: JsonRejection) -> ApiError {
    invalid_input(rejection.body_text())
}
