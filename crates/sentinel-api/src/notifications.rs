//! Outbox handlers for organization events.
//!
//! Delivery to a mail or webhook provider is out of scope; the handler logs
//! the event it would deliver.

use std::sync::Arc;

use async_trait::async_trait;
use sentinel_core::event::EventMeta;
use sentinel_org::domain::events::ORG_TOPICS;
use sentinel_outbox::handler::{EventHandler, HandlerError};
use sentinel_outbox::worker::EventWorker;
use serde_json::Value;
use tracing::info;

/// Logs each organization event it receives. Idempotent.
#[derive(Debug, Clone)]
pub struct NotificationHandler {
    topic: &'static str,
}

impl NotificationHandler {
    /// Creates a handler for `topic`.
    #[must_use]
    pub fn new(topic: &'static str) -> Self {
        Self { topic }
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, payload: &Value, meta: &EventMeta) -> Result<(), HandlerError> {
        let org_id = payload
            .get("orgId")
            .and_then(Value::as_str)
            .ok_or("event payload is missing orgId")?;
        info!(
            topic = self.topic,
            org_id,
            tenant_id = meta.tenant_id.as_deref(),
            actor_id = meta.actor_id.as_deref(),
            "notification dispatched"
        );
        Ok(())
    }
}

/// Registers a [`NotificationHandler`] for every organization topic.
pub fn register_org_handlers(worker: &mut EventWorker) {
    for topic in ORG_TOPICS {
        worker.register(*topic, Arc::new(NotificationHandler::new(*topic)));
    }
}
