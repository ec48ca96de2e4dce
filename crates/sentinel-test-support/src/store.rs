//! In-memory transactional store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sentinel_core::error::DomainError;
use sentinel_core::event::{EventRecord, EventStatus};
use sentinel_core::store::{EventStore, StoreTransaction, TransactionalStore};
use uuid::Uuid;

type DocKey = (String, String);

#[derive(Debug, Default)]
struct State {
    documents: HashMap<DocKey, serde_json::Value>,
    events: HashMap<Uuid, EventRecord>,
}

#[derive(Debug, Default)]
struct Faults {
    fetch: AtomicBool,
    update: AtomicBool,
    commit: AtomicBool,
    insert: AtomicBool,
}

/// A store that keeps documents and outbox events in memory.
///
/// Transactions buffer their writes and apply them under one lock on commit;
/// a dropped or rolled-back transaction leaves no trace. Failures can be
/// switched on per operation to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
    faults: Arc<Faults>,
}

fn injected(op: &str) -> DomainError {
    DomainError::Infrastructure(format!("injected {op} failure"))
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `fetch_pending` fail until switched off.
    pub fn fail_fetch(&self, on: bool) {
        self.faults.fetch.store(on, Ordering::SeqCst);
    }

    /// Makes `update_event` fail until switched off.
    pub fn fail_updates(&self, on: bool) {
        self.faults.update.store(on, Ordering::SeqCst);
    }

    /// Makes transaction commits fail until switched off.
    pub fn fail_commits(&self, on: bool) {
        self.faults.commit.store(on, Ordering::SeqCst);
    }

    /// Makes non-transactional event inserts fail until switched off.
    pub fn fail_inserts(&self, on: bool) {
        self.faults.insert.store(on, Ordering::SeqCst);
    }

    /// Writes a document directly, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_document(&self, collection: &str, id: &str, body: serde_json::Value) {
        self.state
            .lock()
            .unwrap()
            .documents
            .insert((collection.to_owned(), id.to_owned()), body);
    }

    /// Writes an event directly, bypassing transactions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed_event(&self, record: EventRecord) {
        self.state.lock().unwrap().events.insert(record.id, record);
    }

    /// Returns a committed document.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn document(&self, collection: &str, id: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .unwrap()
            .documents
            .get(&(collection.to_owned(), id.to_owned()))
            .cloned()
    }

    /// Returns every committed event, oldest first.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn events(&self) -> Vec<EventRecord> {
        let mut events: Vec<EventRecord> =
            self.state.lock().unwrap().events.values().cloned().collect();
        events.sort_by_key(|e| (e.created_at, e.id));
        events
    }

    /// Returns one committed event.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn event(&self, id: Uuid) -> Option<EventRecord> {
        self.state.lock().unwrap().events.get(&id).cloned()
    }
}

#[async_trait]
impl TransactionalStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        Ok(Box::new(InMemoryTransaction {
            store: self.clone(),
            documents: HashMap::new(),
            events: Vec::new(),
        }))
    }
}

/// Buffered writes of one open transaction.
struct InMemoryTransaction {
    store: InMemoryStore,
    /// `None` marks a delete.
    documents: HashMap<DocKey, Option<serde_json::Value>>,
    events: Vec<EventRecord>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_document(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        let key = (collection.to_owned(), id.to_owned());
        if let Some(staged) = self.documents.get(&key) {
            return Ok(staged.clone());
        }
        Ok(self.store.document(collection, id))
    }

    async fn put_document(
        &mut self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<(), DomainError> {
        self.documents
            .insert((collection.to_owned(), id.to_owned()), Some(body));
        Ok(())
    }

    async fn delete_document(&mut self, collection: &str, id: &str) -> Result<bool, DomainError> {
        let existed = self.get_document(collection, id).await?.is_some();
        self.documents
            .insert((collection.to_owned(), id.to_owned()), None);
        Ok(existed)
    }

    async fn insert_event(&mut self, record: &EventRecord) -> Result<(), DomainError> {
        self.events.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let InMemoryTransaction {
            store,
            documents,
            events,
        } = *self;
        if store.faults.commit.load(Ordering::SeqCst) {
            return Err(injected("commit"));
        }
        let mut state = store
            .state
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("store mutex poisoned: {e}")))?;
        for (key, body) in documents {
            match body {
                Some(body) => {
                    state.documents.insert(key, body);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }
        for record in events {
            state.events.insert(record.id, record);
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn insert_event(&self, record: &EventRecord) -> Result<(), DomainError> {
        if self.faults.insert.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }
        self.seed_event(record.clone());
        Ok(())
    }

    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, DomainError> {
        if self.faults.fetch.load(Ordering::SeqCst) {
            return Err(injected("fetch"));
        }
        Ok(self
            .events()
            .into_iter()
            .filter(|e| e.status == EventStatus::Pending && e.next_attempt_at <= now)
            .take(limit)
            .collect())
    }

    async fn update_event(&self, record: &EventRecord) -> Result<(), DomainError> {
        if self.faults.update.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        let mut state = self
            .state
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("store mutex poisoned: {e}")))?;
        let stored = state
            .events
            .get_mut(&record.id)
            .ok_or_else(|| DomainError::NotFound {
                entity: "event",
                id: record.id.to_string(),
            })?;
        stored.status = record.status;
        stored.attempts = record.attempts;
        stored.last_error.clone_from(&record.last_error);
        stored.processed_at = record.processed_at;
        stored.next_attempt_at = record.next_attempt_at;
        stored.locked_until = record.locked_until;
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("store mutex poisoned: {e}")))?;
        let mut reclaimed = 0;
        for record in state.events.values_mut().filter(|e| e.lease_expired(now)) {
            record.status = EventStatus::Pending;
            record.locked_until = None;
            record.next_attempt_at = now;
            reclaimed += 1;
        }
        Ok(reclaimed)
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>, DomainError> {
        Ok(self.event(id))
    }
}
