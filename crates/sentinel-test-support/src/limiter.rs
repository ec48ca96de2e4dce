use std::time::Duration;

use async_trait::async_trait;
use sentinel_core::error::DomainError;
use sentinel_resilience::rate_limit::{RateLimitDecision, RateLimiter};

/// Rejects every caller.
#[derive(Debug, Clone, Copy)]
pub struct DenyAllRateLimiter {
    /// Reported back as the retry hint.
    pub retry_after: Duration,
}

impl Default for DenyAllRateLimiter {
    fn default() -> Self {
        Self {
            retry_after: Duration::from_secs(60),
        }
    }
}

#[async_trait]
impl RateLimiter for DenyAllRateLimiter {
    async fn check(&self, _caller_key: &str) -> Result<RateLimitDecision, DomainError> {
        Ok(RateLimitDecision::Rejected {
            retry_after: self.retry_after,
        })
    }
}
