//! Event worker.
//!
//! Each [`EventWorker::process_batch`] call is short-lived and stateless:
//! reclaim expired leases, fetch up to `limit` eligible `PENDING` events
//! oldest first, then deliver them concurrently. One event's handler failure
//! never affects its siblings; only store failures fail the batch.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::join_all;
use sentinel_core::clock::Clock;
use sentinel_core::error::DomainError;
use sentinel_core::event::{EventMeta, EventRecord};
use sentinel_core::store::EventStore;
use sentinel_core::trace;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::handler::{EventHandler, FnHandler, HandlerError};
use crate::metrics;
use crate::policy::{UnknownTopicPolicy, WorkerConfig};

/// `last_error` for an event reclaimed after its final attempt.
pub const LEASE_EXPIRED_AFTER_FINAL_ATTEMPT: &str = "lease expired after final attempt";

/// Summary of one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Events fetched and attempted.
    pub processed: usize,
    /// Events now `COMPLETED`.
    pub completed: usize,
    /// Events back in `PENDING` awaiting another attempt.
    pub retried: usize,
    /// Events now `FAILED`.
    pub failed: usize,
    /// Events now `SKIPPED`.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Retried,
    Failed,
    Skipped,
}

impl Outcome {
    fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retried => "retried",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Dispatches outbox events to handlers registered by topic.
pub struct EventWorker {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    config: WorkerConfig,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl std::fmt::Debug for EventWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventWorker")
            .field("config", &self.config)
            .field("topics", &self.registered_topics())
            .finish_non_exhaustive()
    }
}

impl EventWorker {
    /// Creates a worker with no handlers.
    #[must_use]
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>, config: WorkerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            handlers: HashMap::new(),
        }
    }

    /// The worker's settings.
    #[must_use]
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Registers `handler` for `topic`. A later registration for the same
    /// topic replaces the earlier one.
    pub fn register(&mut self, topic: impl Into<String>, handler: Arc<dyn EventHandler>) {
        let topic = topic.into();
        if self.handlers.insert(topic.clone(), handler).is_some() {
            warn!(topic = %topic, "event handler replaced");
        }
    }

    /// Registers an async closure for `topic`.
    pub fn register_fn<F, Fut>(&mut self, topic: impl Into<String>, f: F)
    where
        F: Fn(Value, EventMeta) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.register(topic, Arc::new(FnHandler::new(f)));
    }

    /// Topics with a handler, sorted.
    #[must_use]
    pub fn registered_topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    /// Checks at startup that every topic in `expected` has a handler.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Precondition` listing the missing topics.
    pub fn validate_topics(&self, expected: &[&str]) -> Result<(), DomainError> {
        let missing: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|topic| !self.handlers.contains_key(*topic))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Precondition(format!(
                "no handler registered for topics: {}",
                missing.join(", ")
            )))
        }
    }

    /// Moves `PROCESSING` events whose lease expired back to `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn reclaim_stale(&self) -> Result<u64, DomainError> {
        let reclaimed = self.store.reclaim_expired(self.clock.now()).await?;
        if reclaimed > 0 {
            warn!(reclaimed, "reclaimed events with expired leases");
        }
        Ok(reclaimed)
    }

    /// Processes one batch of at most `limit` events.
    ///
    /// # Errors
    ///
    /// Fails only on store errors. A failed reclaim or fetch aborts before
    /// any handler runs; a failed status write is reported after every
    /// event in the batch has settled.
    #[instrument(skip(self))]
    pub async fn process_batch(&self, limit: usize) -> Result<BatchReport, DomainError> {
        self.reclaim_stale().await?;
        let events = self.store.fetch_pending(limit, self.clock.now()).await?;
        if events.is_empty() {
            debug!("no pending events");
            return Ok(BatchReport::default());
        }

        let outcomes = join_all(events.into_iter().map(|record| self.process_one(record))).await;

        let mut report = BatchReport {
            processed: outcomes.len(),
            ..BatchReport::default()
        };
        let mut store_error = None;
        for outcome in outcomes {
            match outcome {
                Ok(Outcome::Completed) => report.completed += 1,
                Ok(Outcome::Retried) => report.retried += 1,
                Ok(Outcome::Failed) => report.failed += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    store_error.get_or_insert(err);
                }
            }
        }
        if let Some(err) = store_error {
            error!(error = %err, "batch finished with store failures");
            return Err(err);
        }

        info!(
            processed = report.processed,
            completed = report.completed,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            "batch processed"
        );
        Ok(report)
    }

    /// Processes one batch using the configured batch limit.
    ///
    /// # Errors
    ///
    /// See [`EventWorker::process_batch`].
    pub async fn process_default_batch(&self) -> Result<BatchReport, DomainError> {
        self.process_batch(self.config.batch_limit).await
    }

    async fn process_one(&self, mut record: EventRecord) -> Result<Outcome, DomainError> {
        let attempts = u32::try_from(record.attempts).unwrap_or(0);
        if self.config.retry.exhausted(attempts) {
            return self.fail_exhausted(record, attempts).await;
        }

        record.claim(self.clock.now(), to_chrono(self.config.lease));
        self.store.update_event(&record).await?;

        let outcome = match self.handlers.get(&record.topic).cloned() {
            Some(handler) => match self.invoke(handler.as_ref(), &record).await {
                Ok(()) => {
                    record.complete(self.clock.now());
                    Outcome::Completed
                }
                Err(message) => self.settle_failure(&mut record, message),
            },
            None => self.settle_unknown(&mut record),
        };

        self.store.update_event(&record).await?;
        metrics::record_event(&record.topic, outcome.as_str());
        Ok(outcome)
    }

    /// A reclaimed event whose final attempt never settled is failed without
    /// another delivery.
    async fn fail_exhausted(
        &self,
        mut record: EventRecord,
        attempts: u32,
    ) -> Result<Outcome, DomainError> {
        error!(
            event_id = %record.id,
            topic = %record.topic,
            attempts,
            "lease expired after final attempt, failing event"
        );
        record.fail(self.clock.now(), LEASE_EXPIRED_AFTER_FINAL_ATTEMPT);
        self.store.update_event(&record).await?;
        metrics::record_event(&record.topic, Outcome::Failed.as_str());
        Ok(Outcome::Failed)
    }

    /// Runs the handler under the event's trace id and the handler deadline.
    /// Errors, timeouts and panics all come back as the message to persist.
    async fn invoke(&self, handler: &dyn EventHandler, record: &EventRecord) -> Result<(), String> {
        let meta = record.meta();
        let trace_id = meta.trace_id.clone().unwrap_or_else(trace::new_trace_id);
        let call = AssertUnwindSafe(handler.handle(&record.payload, &meta)).catch_unwind();
        let deadline = self.config.handler_timeout;

        match trace::scope(trace_id, tokio::time::timeout(deadline, call)).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(err.to_string()),
            Ok(Err(panic)) => Err(format!("handler panicked: {}", panic_message(&*panic))),
            Err(_) => Err(format!(
                "handler timed out after {}ms",
                deadline.as_millis()
            )),
        }
    }

    fn settle_failure(&self, record: &mut EventRecord, message: String) -> Outcome {
        let now = self.clock.now();
        let attempts = u32::try_from(record.attempts).unwrap_or(0);
        if self.config.retry.exhausted(attempts) {
            error!(
                event_id = %record.id,
                topic = %record.topic,
                attempts,
                error = %message,
                "event failed permanently"
            );
            record.fail(now, message);
            Outcome::Failed
        } else {
            let next = after(now, self.config.retry.backoff_for(attempts));
            warn!(
                event_id = %record.id,
                topic = %record.topic,
                attempts,
                next_attempt_at = %next,
                error = %message,
                "event handler failed, will retry"
            );
            record.retry_at(next, message);
            Outcome::Retried
        }
    }

    fn settle_unknown(&self, record: &mut EventRecord) -> Outcome {
        let now = self.clock.now();
        match self.config.unknown_topic {
            UnknownTopicPolicy::Complete => {
                debug!(event_id = %record.id, topic = %record.topic, "no handler, completing");
                record.complete(now);
                Outcome::Completed
            }
            UnknownTopicPolicy::Skip => {
                info!(event_id = %record.id, topic = %record.topic, "no handler, skipping");
                record.skip(now);
                Outcome::Skipped
            }
            UnknownTopicPolicy::Fail => {
                warn!(event_id = %record.id, topic = %record.topic, "no handler, failing");
                record.fail(now, no_handler(&record.topic));
                Outcome::Failed
            }
            UnknownTopicPolicy::Retry => {
                let message = no_handler(&record.topic);
                self.settle_failure(record, message)
            }
        }
    }
}

fn no_handler(topic: &str) -> String {
    format!("no handler registered for topic {topic}")
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
