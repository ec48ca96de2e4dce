//! Store ports consumed by the outbox writer and the event worker.
//!
//! The primary store is treated as an opaque transactional document store.
//! Event records live in the same store so they commit together with the
//! mutation they describe.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::EventRecord;

/// Boxed future returned by [`run_transaction`] bodies.
pub type TxFuture<'t, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 't>>;

/// An open all-or-nothing unit of work against the primary store.
///
/// Dropping a transaction without calling [`StoreTransaction::commit`] must
/// discard every write made through it.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads a document, observing this transaction's own writes.
    async fn get_document(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, DomainError>;

    /// Creates or replaces a document.
    async fn put_document(
        &mut self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<(), DomainError>;

    /// Deletes a document. Returns whether it existed.
    async fn delete_document(&mut self, collection: &str, id: &str) -> Result<bool, DomainError>;

    /// Stages an outbox event.
    async fn insert_event(&mut self, record: &EventRecord) -> Result<(), DomainError>;

    /// Makes every staged write visible atomically.
    async fn commit(self: Box<Self>) -> Result<(), DomainError>;

    /// Discards every staged write.
    async fn rollback(self: Box<Self>) -> Result<(), DomainError>;
}

/// A store that can open transactions.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError>;
}

/// Worker-side access to outbox events.
///
/// Updates are last-writer-wins per record; there is no optimistic
/// concurrency control, so only one worker may process a given event at a time.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Inserts an event outside any transaction (best-effort tier).
    async fn insert_event(&self, record: &EventRecord) -> Result<(), DomainError>;

    /// Up to `limit` `PENDING` events with `next_attempt_at <= now`, oldest
    /// `created_at` first.
    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, DomainError>;

    /// Persists the worker-owned fields of `record` (status, attempts,
    /// `last_error`, `processed_at`, `next_attempt_at`, `locked_until`).
    async fn update_event(&self, record: &EventRecord) -> Result<(), DomainError>;

    /// Moves `PROCESSING` events whose lease ended before `now` back to
    /// `PENDING`. Returns how many were reclaimed.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError>;

    /// Loads one event.
    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>, DomainError>;
}

/// Runs `body` inside a transaction: commits when it returns `Ok`, rolls
/// back when it returns `Err`.
///
/// The body receives the open transaction and must return a boxed future
/// borrowing it, for example
/// `run_transaction(store, |tx| Box::pin(async move { tx.put_document(..).await }))`.
///
/// # Errors
///
/// Returns the body's error after rolling back, or the store's error
/// (converted with `From<DomainError>`) if begin or commit fails.
pub async fn run_transaction<T, E, F>(store: &dyn TransactionalStore, body: F) -> Result<T, E>
where
    E: From<DomainError>,
    F: for<'t> FnOnce(&'t mut dyn StoreTransaction) -> TxFuture<'t, T, E>,
{
    let mut tx = store.begin().await?;
    let outcome = body(tx.as_mut()).await;
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            // The body's error is the one worth reporting; an uncommitted
            // transaction is discarded even if the explicit rollback fails.
            tx.rollback().await.ok();
            Err(err)
        }
    }
}
