//! Per-caller admission gate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sentinel_core::clock::Clock;
use sentinel_core::error::DomainError;

/// Caller key used when the request carries no identity.
pub const ANONYMOUS_CALLER: &str = "anonymous";

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The call may proceed.
    Allowed,
    /// The caller is over its budget.
    Rejected {
        /// Time until the caller's window resets.
        retry_after: Duration,
    },
}

/// Admission check keyed by caller identity (typically the source IP).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Counts one call for `caller_key` and decides whether it may proceed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the limiter's backing state is
    /// unavailable.
    async fn check(&self, caller_key: &str) -> Result<RateLimitDecision, DomainError>;
}

/// Limiter that admits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

#[async_trait]
impl RateLimiter for Unlimited {
    async fn check(&self, _caller_key: &str) -> Result<RateLimitDecision, DomainError> {
        Ok(RateLimitDecision::Allowed)
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Windows kept before expired ones are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// In-process fixed-window limiter: at most `max_requests` per caller per
/// `window`.
pub struct FixedWindowRateLimiter {
    max_requests: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: DashMap<String, Window>,
}

impl std::fmt::Debug for FixedWindowRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowRateLimiter")
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl FixedWindowRateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_requests,
            window,
            clock,
            windows: DashMap::new(),
        }
    }

    fn window_millis(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

#[async_trait]
impl RateLimiter for FixedWindowRateLimiter {
    async fn check(&self, caller_key: &str) -> Result<RateLimitDecision, DomainError> {
        let now = self.clock.now();
        let window_ms = self.window_millis();

        if self.windows.len() >= SWEEP_THRESHOLD {
            self.windows
                .retain(|_, w| (now - w.started_at).num_milliseconds() < window_ms);
        }

        let mut window = self.windows.entry(caller_key.to_owned()).or_insert(Window {
            started_at: now,
            count: 0,
        });
        let elapsed = (now - window.started_at).num_milliseconds();
        if elapsed >= window_ms {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            let remaining = window_ms - (now - window.started_at).num_milliseconds();
            return Ok(RateLimitDecision::Rejected {
                retry_after: Duration::from_millis(u64::try_from(remaining).unwrap_or(0)),
            });
        }
        window.count += 1;
        Ok(RateLimitDecision::Allowed)
    }
}
