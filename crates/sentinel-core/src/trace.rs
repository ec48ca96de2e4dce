//! Ambient trace id for correlating failures with log lines.
//!
//! The id lives in a task-local slot. Request middleware and the event worker
//! install one with [`scope`]; everything below reads it with
//! [`current_trace_id`], which fabricates a fresh id when none is installed.

use std::future::Future;

use uuid::Uuid;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Generates a new random trace id.
#[must_use]
pub fn new_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Returns the trace id installed for the current task, if any.
#[must_use]
pub fn ambient_trace_id() -> Option<String> {
    TRACE_ID.try_with(Clone::clone).ok()
}

/// Returns the ambient trace id, or a freshly generated one.
#[must_use]
pub fn current_trace_id() -> String {
    ambient_trace_id().unwrap_or_else(new_trace_id)
}

/// Runs `fut` with `trace_id` installed as the ambient trace id.
pub async fn scope<F>(trace_id: impl Into<String>, fut: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id.into(), fut).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scope_installs_trace_id() {
        let seen = scope("abc123", async { current_trace_id() }).await;
        assert_eq!(seen, "abc123");
    }

    #[tokio::test]
    async fn test_missing_scope_fabricates_distinct_ids() {
        assert!(ambient_trace_id().is_none());

        let first = current_trace_id();
        let second = current_trace_id();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }
}
