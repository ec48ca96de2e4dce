//! Guarded-execution metrics.
//!
//! These complement the structured log lines; installing a recorder is up to
//! the host process.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Guarded calls by operation and outcome.
pub const GUARDED_OPERATIONS: &str = "sentinel_guarded_operations_total";

/// Guarded call latency.
pub const GUARDED_OPERATION_DURATION: &str = "sentinel_guarded_operation_duration_seconds";

/// Circuit open transitions.
pub const CIRCUIT_OPENED: &str = "sentinel_circuit_opened_total";

/// Registers metric descriptions. Call once after installing a recorder.
pub fn register_metrics() {
    describe_counter!(GUARDED_OPERATIONS, "Guarded operations by outcome");
    describe_histogram!(
        GUARDED_OPERATION_DURATION,
        "Duration of guarded operations in seconds"
    );
    describe_counter!(CIRCUIT_OPENED, "Circuit breaker open transitions");
}

/// Records one finished guarded call. `outcome` is `"success"` or an error code.
pub fn record_operation(operation: &str, outcome: &'static str, elapsed: Duration) {
    counter!(
        GUARDED_OPERATIONS,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!(GUARDED_OPERATION_DURATION, "operation" => operation.to_string())
        .record(elapsed.as_secs_f64());
}

/// Records a breaker opening.
pub fn record_circuit_opened(operation: &str) {
    counter!(CIRCUIT_OPENED, "operation" => operation.to_string()).increment(1);
}
