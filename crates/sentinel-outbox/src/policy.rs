//! Worker policies: retry cap, backoff and unknown-topic handling.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How failed deliveries are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before an event is marked `FAILED`.
    pub max_attempts: u32,
    /// Delay after the first failed attempt. Doubles per attempt. Zero
    /// makes a failed event eligible again on the next batch.
    pub base_backoff: Duration,
    /// Upper bound on the delay.
    pub max_backoff: Duration,
}

/// Three attempts, each eligible again on the next batch.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    /// Same attempt cap, with exponential backoff from `base` capped at
    /// `max`.
    #[must_use]
    pub fn with_backoff(self, base: Duration, max: Duration) -> Self {
        Self {
            base_backoff: base,
            max_backoff: max,
            ..self
        }
    }

    /// Delay before retrying after `attempts` failed attempts:
    /// `min(base * 2^(attempts - 1), max)`.
    #[must_use]
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_backoff
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }

    /// Whether an event that has used `attempts` attempts is out of retries.
    #[must_use]
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// What the worker does with an event whose topic has no handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTopicPolicy {
    /// Mark `COMPLETED`: the event is considered absorbed.
    #[default]
    Complete,
    /// Mark `SKIPPED`, terminal and distinguishable from real completions.
    Skip,
    /// Mark `FAILED` immediately.
    Fail,
    /// Count as a failed attempt, so a late-registered handler can still
    /// pick the event up.
    Retry,
}

impl UnknownTopicPolicy {
    /// Configuration spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Skip => "skip",
            Self::Fail => "fail",
            Self::Retry => "retry",
        }
    }
}

impl fmt::Display for UnknownTopicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized [`UnknownTopicPolicy`] spelling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown topic policy must be one of complete, skip, fail, retry (got {0:?})")]
pub struct ParsePolicyError(pub String);

impl FromStr for UnknownTopicPolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "skip" => Ok(Self::Skip),
            "fail" => Ok(Self::Fail),
            "retry" => Ok(Self::Retry),
            _ => Err(ParsePolicyError(s.to_owned())),
        }
    }
}

/// Event worker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Batch size used when the trigger does not pass one.
    pub batch_limit: usize,
    /// Retry cap and backoff.
    pub retry: RetryPolicy,
    /// Handling of topics without a handler.
    pub unknown_topic: UnknownTopicPolicy,
    /// How long a claimed event stays `PROCESSING` before it may be
    /// reclaimed.
    pub lease: Duration,
    /// Deadline for a single handler call. Keep it below `lease`.
    pub handler_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_limit: 10,
            retry: RetryPolicy::default(),
            unknown_topic: UnknownTopicPolicy::default(),
            lease: Duration::from_secs(300),
            handler_timeout: Duration::from_secs(60),
        }
    }
}

/// Allowance for the reclaim, fetch and status writes around a batch's
/// handlers.
pub const STORE_IO_ALLOWANCE: Duration = Duration::from_secs(10);

impl WorkerConfig {
    /// Longest a batch can legitimately take: handlers run concurrently, each
    /// bounded by `handler_timeout`, bracketed by store round trips. A caller
    /// that cancels a batch sooner abandons claimed events mid-lease.
    #[must_use]
    pub fn batch_deadline(&self) -> Duration {
        self.handler_timeout.saturating_add(STORE_IO_ALLOWANCE)
    }
}
