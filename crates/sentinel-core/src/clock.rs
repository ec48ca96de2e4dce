//! Clock abstraction so cooldowns, leases and backoff are testable.

use chrono::{DateTime, Utc};

/// Abstraction over wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Milliseconds elapsed since `earlier`, saturating at zero when the
    /// clock moved backwards.
    fn millis_since(&self, earlier: DateTime<Utc>) -> i64 {
        (self.now() - earlier).num_milliseconds().max(0)
    }
}

/// Production clock that delegates to the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
