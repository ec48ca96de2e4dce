//! Integration tests for `PgStore`. Need a `PostgreSQL` instance at `DATABASE_URL`.

use chrono::{Duration, DurationRound, TimeDelta, Utc};
use sentinel_core::event::{EventMeta, EventRecord, EventStatus};
use sentinel_core::store::{EventStore, TransactionalStore};
use sentinel_store::pg_store::PgStore;
use serde_json::json;
use sqlx::PgPool;

fn pending(topic: &str) -> EventRecord {
    // Postgres keeps microseconds; truncate so round-tripped values compare equal.
    let now = Utc::now()
        .duration_trunc(TimeDelta::milliseconds(1))
        .unwrap();
    EventRecord::pending(
        topic,
        json!({"email": "a@b.com"}),
        EventMeta::new("org-1", Some("user-1".into())),
        now,
    )
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_committed_transaction_persists_document_and_event(pool: PgPool) {
    let store = PgStore::new(pool);
    let record = pending("invite.created");

    let mut tx = store.begin().await.unwrap();
    tx.put_document("invites", "i-1", json!({"email": "a@b.com"}))
        .await
        .unwrap();
    tx.insert_event(&record).await.unwrap();
    tx.commit().await.unwrap();

    let loaded = store.get_event(record.id).await.unwrap().unwrap();
    assert_eq!(loaded, record);
    let mut tx = store.begin().await.unwrap();
    assert!(tx.get_document("invites", "i-1").await.unwrap().is_some());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_rolled_back_transaction_leaves_nothing(pool: PgPool) {
    let store = PgStore::new(pool);
    let record = pending("invite.created");

    let mut tx = store.begin().await.unwrap();
    tx.put_document("invites", "i-2", json!({})).await.unwrap();
    tx.insert_event(&record).await.unwrap();
    tx.rollback().await.unwrap();

    assert!(store.get_event(record.id).await.unwrap().is_none());
    let mut tx = store.begin().await.unwrap();
    assert!(tx.get_document("invites", "i-2").await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_delete_document_reports_existence(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut tx = store.begin().await.unwrap();
    tx.put_document("members", "u-1", json!({"role": "admin"}))
        .await
        .unwrap();

    assert!(tx.delete_document("members", "u-1").await.unwrap());
    assert!(!tx.delete_document("members", "u-1").await.unwrap());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_fetch_pending_skips_deferred_and_orders_by_creation(pool: PgPool) {
    let store = PgStore::new(pool);
    let older = pending("a");
    let mut newer = pending("b");
    newer.created_at = older.created_at + Duration::seconds(1);
    let mut deferred = pending("c");
    deferred.next_attempt_at = older.created_at + Duration::hours(1);
    for record in [&newer, &deferred, &older] {
        store.insert_event(record).await.unwrap();
    }

    let due = store
        .fetch_pending(10, older.created_at + Duration::seconds(5))
        .await
        .unwrap();

    let ids: Vec<_> = due.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_update_and_reclaim_expired_lease(pool: PgPool) {
    let store = PgStore::new(pool);
    let mut record = pending("member.removed");
    store.insert_event(&record).await.unwrap();
    let now = record.created_at;

    record.claim(now, Duration::seconds(30));
    store.update_event(&record).await.unwrap();
    assert_eq!(store.reclaim_expired(now).await.unwrap(), 0);

    let reclaimed = store
        .reclaim_expired(now + Duration::seconds(31))
        .await
        .unwrap();

    assert_eq!(reclaimed, 1);
    let loaded = store.get_event(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, EventStatus::Pending);
    assert_eq!(loaded.attempts, 1);
    assert!(loaded.locked_until.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn test_update_missing_event_is_not_found(pool: PgPool) {
    let store = PgStore::new(pool);

    let err = store.update_event(&pending("t")).await.unwrap_err();

    assert_eq!(err.code(), sentinel_core::error::ErrorCode::NotFound);
}
