//! Outbox operations: batch processing, lease reclaim and event lookup.
//!
//! A scheduler (cron, a queue trigger, or the in-process poller) calls
//! `process-batch`; each call is one guarded operation.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use sentinel_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ok};
use crate::routes::{guard_options, invalid_input};
use crate::state::AppState;

/// Guarded operation name for batch processing.
pub const PROCESS_BATCH_OPERATION: &str = "events.process_batch";

/// Guarded operation name for lease reclaim.
pub const RECLAIM_OPERATION: &str = "events.reclaim";

/// Guarded operation name for event lookup.
pub const GET_EVENT_OPERATION: &str = "events.get";

/// Largest batch a caller may request.
pub const MAX_BATCH_LIMIT: usize = 100;

/// Deadline for a guarded batch: the executor default, raised to cover
/// every handler's own timeout plus store I/O.
#[must_use]
pub fn batch_timeout(state: &AppState) -> Duration {
    state
        .executor
        .config()
        .default_timeout
        .max(state.worker.config().batch_deadline())
}

/// Body of `POST /process-batch`. Omit it to use the configured limit.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessBatchRequest {
    /// Events to fetch, at most [`MAX_BATCH_LIMIT`].
    pub limit: Option<usize>,
}

/// Response of `POST /reclaim`.
#[derive(Debug, Serialize)]
pub struct ReclaimResponse {
    /// Events moved back to `PENDING`.
    pub reclaimed: u64,
}

/// POST /api/v1/events/process-batch
async fn process_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ProcessBatchRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ProcessBatchRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| invalid_input(format!("invalid request body: {e}")))?
    };
    let limit = request
        .limit
        .unwrap_or(state.worker.config().batch_limit);
    if limit == 0 || limit > MAX_BATCH_LIMIT {
        return Err(invalid_input(format!(
            "limit must be between 1 and {MAX_BATCH_LIMIT}"
        )));
    }

    let options = guard_options(&headers).timeout(batch_timeout(&state));
    let worker = Arc::clone(&state.worker);
    let report = state
        .executor
        .execute_with(PROCESS_BATCH_OPERATION, options, move || async move {
            worker.process_batch(limit).await
        })
        .await?;
    Ok(ok(report))
}

/// POST /api/v1/events/reclaim
async fn reclaim(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let worker = Arc::clone(&state.worker);
    let reclaimed = state
        .executor
        .execute_with(RECLAIM_OPERATION, guard_options(&headers), move || async move {
            worker.reclaim_stale().await
        })
        .await?;
    Ok(ok(ReclaimResponse { reclaimed }))
}

/// GET /api/v1/events/{id}
async fn get_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id: Uuid = raw_id
        .parse()
        .map_err(|_| invalid_input(format!("invalid event id: {raw_id}")))?;

    let store = Arc::clone(&state.event_store);
    let record = state
        .executor
        .execute_with(GET_EVENT_OPERATION, guard_options(&headers), move || async move {
            store
                .get_event(id)
                .await?
                .ok_or_else(|| DomainError::NotFound {
                    entity: "event",
                    id: id.to_string(),
                })
        })
        .await?;
    Ok(ok(record))
}

/// Returns the router for outbox operations.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process-batch", post(process_batch))
        .route("/reclaim", post(reclaim))
        .route("/{id}", get(get_event))
}
