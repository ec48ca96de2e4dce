//! Outbox delivery metrics.

use metrics::{counter, describe_counter};

/// Settled delivery attempts by topic and outcome.
pub const OUTBOX_EVENTS: &str = "sentinel_outbox_events_total";

/// Registers metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(OUTBOX_EVENTS, "Outbox delivery attempts by outcome");
}

/// Records one settled attempt. `outcome` is `completed`, `retried`,
/// `failed` or `skipped`.
pub fn record_event(topic: &str, outcome: &'static str) {
    counter!(OUTBOX_EVENTS, "topic" => topic.to_string(), "outcome" => outcome).increment(1);
}
