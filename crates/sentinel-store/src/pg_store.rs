//! `PostgreSQL` implementation of `TransactionalStore` and `EventStore`.
//!
//! Documents and outbox events share one database, so an event staged in a
//! [`PgStoreTransaction`] commits together with the documents it describes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use sentinel_core::error::DomainError;
use sentinel_core::event::EventRecord;
use sentinel_core::store::{EventStore, StoreTransaction, TransactionalStore};

const EVENT_COLUMNS: &str = "id, topic, payload, status, attempts, last_error, trace_id, \
     actor_id, tenant_id, created_at, processed_at, next_attempt_at, locked_until";

/// Applies the bundled migrations.
///
/// # Errors
///
/// Returns the migrator's error if a migration fails or the recorded
/// history diverges from the bundled files.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

fn infra(context: &'static str) -> impl FnOnce(sqlx::Error) -> DomainError {
    move |e| DomainError::Infrastructure(format!("{context}: {e}"))
}

fn decode(e: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("failed to decode outbox event: {e}"))
}

fn event_from_row(row: &PgRow) -> Result<EventRecord, DomainError> {
    let status: String = row.try_get("status").map_err(decode)?;
    Ok(EventRecord {
        id: row.try_get("id").map_err(decode)?,
        topic: row.try_get("topic").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        status: status.parse()?,
        attempts: row.try_get("attempts").map_err(decode)?,
        last_error: row.try_get("last_error").map_err(decode)?,
        trace_id: row.try_get("trace_id").map_err(decode)?,
        actor_id: row.try_get("actor_id").map_err(decode)?,
        tenant_id: row.try_get("tenant_id").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        processed_at: row.try_get("processed_at").map_err(decode)?,
        next_attempt_at: row.try_get("next_attempt_at").map_err(decode)?,
        locked_until: row.try_get("locked_until").map_err(decode)?,
    })
}

async fn insert_event_on(conn: &mut PgConnection, record: &EventRecord) -> Result<(), DomainError> {
    sqlx::query(
        "INSERT INTO outbox_events (id, topic, payload, status, attempts, last_error, trace_id, \
         actor_id, tenant_id, created_at, processed_at, next_attempt_at, locked_until) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(record.id)
    .bind(&record.topic)
    .bind(&record.payload)
    .bind(record.status.as_str())
    .bind(record.attempts)
    .bind(&record.last_error)
    .bind(&record.trace_id)
    .bind(&record.actor_id)
    .bind(&record.tenant_id)
    .bind(record.created_at)
    .bind(record.processed_at)
    .bind(record.next_attempt_at)
    .bind(record.locked_until)
    .execute(conn)
    .await
    .map_err(infra("failed to insert outbox event"))?;
    debug!(event_id = %record.id, topic = %record.topic, "outbox event inserted");
    Ok(())
}

/// PostgreSQL-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// An open database transaction. Dropping it without committing rolls back.
#[derive(Debug)]
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TransactionalStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DomainError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(infra("failed to begin transaction"))?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn get_document(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, DomainError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(infra("failed to load document"))?;
        row.map(|r| r.try_get("body"))
            .transpose()
            .map_err(infra("failed to decode document"))
    }

    async fn put_document(
        &mut self,
        collection: &str,
        id: &str,
        body: serde_json::Value,
    ) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO documents (collection, id, body, updated_at) VALUES ($1, $2, $3, NOW()) \
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body, updated_at = NOW()",
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&mut *self.tx)
        .await
        .map_err(infra("failed to store document"))?;
        Ok(())
    }

    async fn delete_document(&mut self, collection: &str, id: &str) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(infra("failed to delete document"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_event(&mut self, record: &EventRecord) -> Result<(), DomainError> {
        insert_event_on(&mut self.tx, record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        let Self { tx } = *self;
        tx.commit().await.map_err(infra("failed to commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DomainError> {
        let Self { tx } = *self;
        tx.rollback()
            .await
            .map_err(infra("failed to roll back transaction"))
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, record: &EventRecord) -> Result<(), DomainError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(infra("failed to acquire connection"))?;
        insert_event_on(&mut conn, record).await
    }

    #[instrument(skip(self))]
    async fn fetch_pending(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<EventRecord>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events \
             WHERE status = 'PENDING' AND next_attempt_at <= $1 \
             ORDER BY created_at, id LIMIT $2"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(infra("failed to fetch pending events"))?;
        rows.iter().map(event_from_row).collect()
    }

    #[instrument(skip(self, record), fields(event_id = %record.id, status = %record.status))]
    async fn update_event(&self, record: &EventRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = $2, attempts = $3, last_error = $4, \
             processed_at = $5, next_attempt_at = $6, locked_until = $7 WHERE id = $1",
        )
        .bind(record.id)
        .bind(record.status.as_str())
        .bind(record.attempts)
        .bind(&record.last_error)
        .bind(record.processed_at)
        .bind(record.next_attempt_at)
        .bind(record.locked_until)
        .execute(&self.pool)
        .await
        .map_err(infra("failed to update outbox event"))?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound {
                entity: "event",
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'PENDING', locked_until = NULL, \
             next_attempt_at = $1 \
             WHERE status = 'PROCESSING' AND (locked_until IS NULL OR locked_until < $1)",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(infra("failed to reclaim expired leases"))?;
        Ok(result.rows_affected())
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<EventRecord>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM outbox_events WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra("failed to load outbox event"))?;
        row.as_ref().map(event_from_row).transpose()
    }
}
