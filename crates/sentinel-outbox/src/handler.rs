//! Event handler interface.

use std::future::Future;

use async_trait::async_trait;
use sentinel_core::event::EventMeta;
use serde_json::Value;

/// Error returned by a handler. Only its message is persisted.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Side effect triggered by an outbox event.
///
/// Delivery is at-least-once: a handler may see the same event again after a
/// retry or a reclaimed lease, so implementations must be idempotent.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Any error schedules a retry, or fails the event once its attempts are
    /// exhausted.
    async fn handle(&self, payload: &Value, meta: &EventMeta) -> Result<(), HandlerError>;
}

/// Adapts an async closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

impl<F> FnHandler<F> {
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Value, EventMeta) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, payload: &Value, meta: &EventMeta) -> Result<(), HandlerError> {
        (self.0)(payload.clone(), meta.clone()).await
    }
}
