//! Guarded executor wiring with shared test doubles.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use sentinel_core::error::{DomainError, ErrorCode, ServiceError};
use sentinel_resilience::circuit_breaker::{BreakerConfig, CircuitState};
use sentinel_resilience::executor::{ExecuteOptions, ExecutorConfig, GuardedExecutor};
use sentinel_resilience::rate_limit::{RateLimitDecision, RateLimiter, Unlimited};
use sentinel_resilience::registry::CircuitBreakerRegistry;
use sentinel_test_support::{DenyAllRateLimiter, ManualClock};

struct BrokenRateLimiter;

#[async_trait]
impl RateLimiter for BrokenRateLimiter {
    async fn check(&self, _caller_key: &str) -> Result<RateLimitDecision, DomainError> {
        Err(DomainError::Infrastructure("redis unreachable".into()))
    }
}

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
    ))
}

fn executor(clock: &Arc<ManualClock>, limiter: Arc<dyn RateLimiter>) -> GuardedExecutor {
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        BreakerConfig {
            threshold: 3,
            cooldown: Duration::from_millis(30_000),
        },
        clock.clone(),
    ));
    GuardedExecutor::new(ExecutorConfig::default(), breakers, limiter)
}

async fn failing_call(executor: &GuardedExecutor, calls: &AtomicU32) -> ErrorCode {
    executor
        .execute("billing.charge", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ServiceError::unexpected("gateway 502"))
        })
        .await
        .unwrap_err()
        .code()
}

#[tokio::test]
async fn test_deny_all_limiter_rejects_with_retry_hint() {
    let executor = executor(&clock(), Arc::new(DenyAllRateLimiter::default()));
    let calls = AtomicU32::new(0);

    let err = executor
        .execute("org.invite_member", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ServiceError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::TooManyRequests);
    assert_eq!(err.details().unwrap()["retryAfterMs"], 60_000);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unavailable_limiter_admits_calls() {
    let executor = executor(&clock(), Arc::new(BrokenRateLimiter));

    let result = executor
        .execute("org.invite_member", || async { Ok::<_, ServiceError>("ok") })
        .await;

    assert_eq!(result.unwrap(), "ok");
}

#[tokio::test]
async fn test_breaker_lifecycle_through_executor() {
    // Arrange
    let clock = clock();
    let executor = executor(&clock, Arc::new(Unlimited));
    let calls = AtomicU32::new(0);

    // Act: three failures open the circuit
    for _ in 0..3 {
        assert_eq!(failing_call(&executor, &calls).await, ErrorCode::InternalError);
    }
    // Assert: open circuit rejects without invoking
    assert_eq!(failing_call(&executor, &calls).await, ErrorCode::ServiceUnavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Exactly at the cooldown boundary the circuit is still open.
    clock.advance_millis(30_000);
    assert_eq!(failing_call(&executor, &calls).await, ErrorCode::ServiceUnavailable);

    // After cooldown one trial runs; success closes the circuit.
    clock.advance_millis(1);
    let result = executor
        .execute("billing.charge", || async { Ok::<_, ServiceError>(7) })
        .await;
    assert_eq!(result.unwrap(), 7);
    let snapshot = executor.breakers().snapshot("billing.charge").unwrap();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
}

#[tokio::test]
async fn test_failed_trial_reopens_circuit() {
    let clock = clock();
    let executor = executor(&clock, Arc::new(Unlimited));
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        failing_call(&executor, &calls).await;
    }
    clock.advance_millis(30_001);

    assert_eq!(failing_call(&executor, &calls).await, ErrorCode::InternalError);

    assert_eq!(failing_call(&executor, &calls).await, ErrorCode::ServiceUnavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_operations_have_independent_breakers() {
    let executor = executor(&clock(), Arc::new(Unlimited));
    let calls = AtomicU32::new(0);
    for _ in 0..3 {
        failing_call(&executor, &calls).await;
    }

    let result = executor
        .execute_with(
            "org.remove_member",
            ExecuteOptions::default().caller("198.51.100.4"),
            || async { Ok::<_, ServiceError>(()) },
        )
        .await;

    assert!(result.is_ok());
}
