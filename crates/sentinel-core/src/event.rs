//! The persisted outbox event record.
//!
//! The record's shape is the only wire-level contract between the writer and
//! the worker, which ship independently. Add fields only with defaults.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Delivery status of an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    /// Waiting for a worker.
    Pending,
    /// Claimed by a worker; the handler may be running.
    Processing,
    /// Delivered (or absorbed by the unknown-topic policy).
    Completed,
    /// Retries exhausted.
    Failed,
    /// No handler registered and the policy says skip.
    Skipped,
}

impl EventStatus {
    /// Returns the stored representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Terminal statuses are never picked up again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "SKIPPED" => Ok(Self::Skipped),
            other => Err(DomainError::Infrastructure(format!(
                "unknown event status: {other}"
            ))),
        }
    }
}

/// Context propagated from the mutation that produced an event to its handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    /// Trace id of the request that wrote the event.
    pub trace_id: Option<String>,
    /// User who performed the mutation.
    pub actor_id: Option<String>,
    /// Tenant (organization) the mutation belongs to.
    pub tenant_id: Option<String>,
}

impl EventMeta {
    /// Meta scoped to a tenant and actor.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, actor_id: Option<String>) -> Self {
        Self {
            trace_id: None,
            actor_id,
            tenant_id: Some(tenant_id.into()),
        }
    }
}

/// A domain event waiting for (or finished with) delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Unique, time-ordered identifier.
    pub id: Uuid,
    /// Routing key used to resolve the handler, e.g. `"member.removed"`.
    pub topic: String,
    /// Handler input.
    pub payload: serde_json::Value,
    /// Delivery status.
    pub status: EventStatus,
    /// Number of delivery attempts started.
    pub attempts: i32,
    /// Message of the most recent handler failure.
    pub last_error: Option<String>,
    /// Trace id of the originating request.
    pub trace_id: Option<String>,
    /// Actor of the originating mutation.
    pub actor_id: Option<String>,
    /// Tenant of the originating mutation.
    pub tenant_id: Option<String>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
    /// When the record reached a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
    /// Earliest time the worker may pick the record up again.
    #[serde(default = "Utc::now")]
    pub next_attempt_at: DateTime<Utc>,
    /// Lease held by the worker while `PROCESSING`.
    #[serde(default)]
    pub locked_until: Option<DateTime<Utc>>,
}

impl EventRecord {
    /// Builds a fresh `PENDING` record, eligible immediately.
    #[must_use]
    pub fn pending(
        topic: impl Into<String>,
        payload: serde_json::Value,
        meta: EventMeta,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            topic: topic.into(),
            payload,
            status: EventStatus::Pending,
            attempts: 0,
            last_error: None,
            trace_id: meta.trace_id,
            actor_id: meta.actor_id,
            tenant_id: meta.tenant_id,
            created_at: now,
            processed_at: None,
            next_attempt_at: now,
            locked_until: None,
        }
    }

    /// The meta handed to handlers.
    #[must_use]
    pub fn meta(&self) -> EventMeta {
        EventMeta {
            trace_id: self.trace_id.clone(),
            actor_id: self.actor_id.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }

    /// `PENDING → PROCESSING`: counts the attempt and takes a lease.
    pub fn claim(&mut self, now: DateTime<Utc>, lease: Duration) {
        self.status = EventStatus::Processing;
        self.attempts += 1;
        self.locked_until = Some(now.checked_add_signed(lease).unwrap_or(DateTime::<Utc>::MAX_UTC));
    }

    /// Handler succeeded.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.finish(EventStatus::Completed, now);
    }

    /// No handler and the policy says skip.
    pub fn skip(&mut self, now: DateTime<Utc>) {
        self.finish(EventStatus::Skipped, now);
    }

    /// Retries exhausted.
    pub fn fail(&mut self, now: DateTime<Utc>, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.finish(EventStatus::Failed, now);
    }

    /// Back to `PENDING`, not eligible before `next_attempt_at`.
    pub fn retry_at(&mut self, next_attempt_at: DateTime<Utc>, error: impl Into<String>) {
        self.status = EventStatus::Pending;
        self.last_error = Some(error.into());
        self.next_attempt_at = next_attempt_at;
        self.locked_until = None;
    }

    /// Whether a `PROCESSING` lease has run out.
    #[must_use]
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == EventStatus::Processing && self.locked_until.is_none_or(|until| until < now)
    }

    fn finish(&mut self, status: EventStatus, now: DateTime<Utc>) {
        self.status = status;
        self.processed_at = Some(now);
        self.locked_until = None;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, second).unwrap()
    }

    #[test]
    fn test_pending_record_is_eligible_immediately() {
        let meta = EventMeta {
            trace_id: Some("t1".into()),
            actor_id: Some("u1".into()),
            tenant_id: Some("org1".into()),
        };

        let record = EventRecord::pending(
            "invite.created",
            serde_json::json!({"email": "a@b.com"}),
            meta.clone(),
            at(0),
        );

        assert_eq!(record.status, EventStatus::Pending);
        assert_eq!(record.attempts, 0);
        assert_eq!(record.next_attempt_at, at(0));
        assert!(record.processed_at.is_none());
        assert_eq!(record.meta(), meta);
    }

    #[test]
    fn test_claim_counts_attempt_and_sets_lease() {
        let mut record =
            EventRecord::pending("t", serde_json::Value::Null, EventMeta::default(), at(0));

        record.claim(at(1), Duration::seconds(30));

        assert_eq!(record.status, EventStatus::Processing);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.locked_until, Some(at(31)));
        assert!(!record.lease_expired(at(31)));
        assert!(record.lease_expired(at(32)));
    }

    #[test]
    fn test_terminal_transitions_release_lease_and_stamp_processed_at() {
        let mut record =
            EventRecord::pending("t", serde_json::Value::Null, EventMeta::default(), at(0));
        record.claim(at(1), Duration::seconds(30));

        record.fail(at(2), "smtp refused");

        assert_eq!(record.status, EventStatus::Failed);
        assert!(record.status.is_terminal());
        assert_eq!(record.last_error.as_deref(), Some("smtp refused"));
        assert_eq!(record.processed_at, Some(at(2)));
        assert!(record.locked_until.is_none());
    }

    #[test]
    fn test_status_parses_stored_form() {
        for status in [
            EventStatus::Pending,
            EventStatus::Processing,
            EventStatus::Completed,
            EventStatus::Failed,
            EventStatus::Skipped,
        ] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_record_serializes_with_stable_field_names() {
        let record =
            EventRecord::pending("t", serde_json::Value::Null, EventMeta::default(), at(0));

        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["status"], "PENDING");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("lastError").is_some());
        assert!(json.get("nextAttemptAt").is_some());
    }
}
