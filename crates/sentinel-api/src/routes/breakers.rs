//! Circuit breaker diagnostics.
//!
//! Read-only and unguarded, so they stay reachable while circuits are open.

use axum::Router;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use sentinel_core::error::{AppError, ErrorCode};
use sentinel_core::trace;

use crate::error::{ApiError, ok};
use crate::state::AppState;

/// GET /api/v1/breakers
async fn list_breakers(State(state): State<AppState>) -> impl IntoResponse {
    ok(state.executor.breakers().snapshots())
}

/// GET /api/v1/breakers/{operation}
async fn get_breaker(
    State(state): State<AppState>,
    Path(operation): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .executor
        .breakers()
        .snapshot(&operation)
        .map(ok)
        .ok_or_else(|| {
            ApiError(AppError::new(
                ErrorCode::NotFound,
                format!("breaker not found: {operation}"),
                trace::current_trace_id(),
            ))
        })
}

/// Returns the breaker diagnostics router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/breakers", get(list_breakers))
        .route("/api/v1/breakers/{operation}", get(get_breaker))
}
