//! Outbox writer.
//!
//! Two tiers:
//! - [`OutboxWriter::create_event`] stages the event in the caller's store
//!   transaction, so it commits or rolls back with the mutation it reports.
//! - [`OutboxWriter::publish`] inserts directly and never fails the caller;
//!   for side effects where losing an event is acceptable (audit trail).

use std::sync::Arc;

use sentinel_core::clock::Clock;
use sentinel_core::error::DomainError;
use sentinel_core::event::{EventMeta, EventRecord};
use sentinel_core::store::{EventStore, StoreTransaction};
use sentinel_core::trace;
use serde_json::Value;
use tracing::{debug, warn};

/// Builds `PENDING` event records and writes them to the store.
#[derive(Clone)]
pub struct OutboxWriter {
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OutboxWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxWriter").finish_non_exhaustive()
    }
}

impl OutboxWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Stages a new event inside `tx`.
    ///
    /// A missing `meta.trace_id` is filled from the ambient trace context.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the caller's transaction should then be
    /// rolled back.
    pub async fn create_event(
        &self,
        tx: &mut dyn StoreTransaction,
        topic: &str,
        payload: Value,
        meta: EventMeta,
    ) -> Result<EventRecord, DomainError> {
        let record = self.record(topic, payload, meta);
        tx.insert_event(&record).await?;
        debug!(event_id = %record.id, topic, "event staged");
        Ok(record)
    }

    /// Inserts a new event outside any transaction. Failures are logged and
    /// swallowed.
    pub async fn publish(
        &self,
        store: &dyn EventStore,
        topic: &str,
        payload: Value,
        meta: EventMeta,
    ) -> Option<EventRecord> {
        let record = self.record(topic, payload, meta);
        match store.insert_event(&record).await {
            Ok(()) => {
                debug!(event_id = %record.id, topic, "event published");
                Some(record)
            }
            Err(err) => {
                warn!(topic, error = %err, "best-effort event dropped");
                None
            }
        }
    }

    fn record(&self, topic: &str, payload: Value, mut meta: EventMeta) -> EventRecord {
        meta.trace_id.get_or_insert_with(trace::current_trace_id);
        EventRecord::pending(topic, payload, meta, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sentinel_core::event::EventStatus;
    use sentinel_core::store::run_transaction;
    use sentinel_test_support::{FixedClock, InMemoryStore};
    use serde_json::json;

    use super::*;

    fn writer() -> OutboxWriter {
        OutboxWriter::new(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap(),
        )))
    }

    #[tokio::test]
    async fn test_committed_transaction_leaves_pending_event() {
        let store = InMemoryStore::new();
        let writer = writer();

        let record = run_transaction(&store, |tx| {
            Box::pin(async move {
                tx.put_document("invites", "i1", json!({"email": "a@b.com"}))
                    .await?;
                writer
                    .create_event(
                        tx,
                        "invite.created",
                        json!({"email": "a@b.com"}),
                        EventMeta::new("org1", None),
                    )
                    .await
            })
        })
        .await
        .unwrap();

        let stored = store.event(record.id).unwrap();
        assert_eq!(stored.status, EventStatus::Pending);
        assert_eq!(stored.attempts, 0);
        assert!(store.document("invites", "i1").is_some());
    }

    #[tokio::test]
    async fn test_rolled_back_transaction_leaves_no_event() {
        let store = InMemoryStore::new();
        let writer = writer();

        let result: Result<EventRecord, DomainError> = run_transaction(&store, |tx| {
            Box::pin(async move {
                writer
                    .create_event(tx, "invite.created", json!({}), EventMeta::default())
                    .await?;
                Err(DomainError::AlreadyExists("invite for a@b.com".into()))
            })
        })
        .await;

        assert!(result.is_err());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_event() {
        let store = InMemoryStore::new();
        store.fail_commits(true);
        let writer = writer();

        let result: Result<EventRecord, DomainError> = run_transaction(&store, |tx| {
            Box::pin(async move {
                writer
                    .create_event(tx, "invite.created", json!({}), EventMeta::default())
                    .await
            })
        })
        .await;

        assert!(result.is_err());
        assert!(store.events().is_empty());
    }

    #[tokio::test]
    async fn test_trace_id_defaults_to_ambient_context() {
        let store = InMemoryStore::new();
        let writer = writer();

        let record = trace::scope(
            "req-9",
            writer.publish(&store, "audit.recorded", json!({}), EventMeta::default()),
        )
        .await
        .unwrap();

        assert_eq!(record.trace_id.as_deref(), Some("req-9"));
    }

    #[tokio::test]
    async fn test_explicit_trace_id_is_kept() {
        let store = InMemoryStore::new();
        let meta = EventMeta {
            trace_id: Some("caller-trace".into()),
            ..EventMeta::default()
        };

        let writer = writer();
        let publish = writer.publish(&store, "audit.recorded", json!({}), meta);
        let record = trace::scope("req-9", publish).await.unwrap();

        assert_eq!(record.trace_id.as_deref(), Some("caller-trace"));
    }

    #[tokio::test]
    async fn test_publish_swallows_store_failure() {
        let store = InMemoryStore::new();
        store.fail_inserts(true);

        let published = writer()
            .publish(&store, "audit.recorded", json!({}), EventMeta::default())
            .await;

        assert!(published.is_none());
        assert!(store.events().is_empty());
    }
}
