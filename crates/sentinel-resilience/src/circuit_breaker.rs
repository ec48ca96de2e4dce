//! Per-operation circuit breaker.
//!
//! `CLOSED` lets calls through and counts consecutive failures. Reaching the
//! threshold opens the circuit. An `OPEN` circuit rejects calls until the
//! cooldown has passed since the last failure; the first call after that
//! becomes the single `HALF_OPEN` trial. A successful trial closes the circuit,
//! a failed one re-opens it.
//!
//! All transitions for one breaker happen under a single mutex, so the gate,
//! the `OPEN → HALF_OPEN` move and the trial reservation are one atomic step.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use sentinel_core::clock::Clock;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics;
use crate::timeout::with_timeout;

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// Time an open circuit waits after the last failure before allowing a trial.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Circuit states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// One trial call is allowed to probe recovery.
    HalfOpen,
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    /// Operation the breaker guards.
    pub operation: String,
    /// Current state.
    pub state: CircuitState,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of the most recent failure. Always set while `OPEN`.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Configured threshold.
    pub threshold: u32,
    /// Configured cooldown in milliseconds.
    pub cooldown_millis: u64,
}

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit rejected the call; the operation never ran.
    #[error("circuit open")]
    Open,

    /// The deadline passed first.
    #[error("timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The operation itself failed.
    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    trial_in_flight: bool,
}

/// Failure-tracking state machine for one operation name.
pub struct CircuitBreaker {
    operation: String,
    config: BreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("operation", &self.operation)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(operation: impl Into<String>, config: BreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            operation: operation.into(),
            config,
            clock,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Current state without attempting any transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Snapshot for inspection.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.lock();
        CircuitBreakerState {
            operation: self.operation.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            threshold: self.config.threshold,
            cooldown_millis: u64::try_from(self.config.cooldown.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Asks to run one call. The returned permit must be settled with the
    /// outcome; dropping it unsettled releases a reserved trial.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] while the circuit rejects calls.
    pub fn try_acquire<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                if self.cooldown_elapsed(&inner) {
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    info!(operation = %self.operation, "circuit half-open, allowing trial call");
                    Ok(Permit::new(self, true))
                } else {
                    Err(BreakerError::Open)
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(BreakerError::Open)
                } else {
                    inner.trial_in_flight = true;
                    Ok(Permit::new(self, true))
                }
            }
        }
    }

    /// Runs `fut` through the breaker under `deadline`.
    ///
    /// `is_failure` decides whether an `Err` from `fut` says something about
    /// downstream health; errors it rejects settle the permit as a success.
    /// Timeouts always count as failures.
    ///
    /// # Errors
    ///
    /// [`BreakerError::Open`] without running `fut`, [`BreakerError::Timeout`]
    /// if the deadline wins, or [`BreakerError::Inner`] with `fut`'s error.
    pub async fn call<T, E, Fut>(
        &self,
        deadline: Duration,
        fut: Fut,
        is_failure: impl Fn(&E) -> bool,
    ) -> Result<T, BreakerError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire::<E>()?;
        match with_timeout(deadline, fut).await {
            Ok(Ok(value)) => {
                permit.succeed();
                Ok(value)
            }
            Ok(Err(err)) => {
                if is_failure(&err) {
                    permit.fail();
                } else {
                    permit.succeed();
                }
                Err(BreakerError::Inner(err))
            }
            Err(elapsed) => {
                permit.fail();
                Err(BreakerError::Timeout(elapsed.0))
            }
        }
    }

    fn cooldown_elapsed(&self, inner: &Inner) -> bool {
        let cooldown = i64::try_from(self.config.cooldown.as_millis()).unwrap_or(i64::MAX);
        inner
            .last_failure_at
            .is_none_or(|at| self.clock.millis_since(at) > cooldown)
    }

    fn record_success(&self, trial: bool) {
        let mut inner = self.lock();
        if trial {
            inner.trial_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.consecutive_failures = 0;
            info!(operation = %self.operation, "circuit closed after successful trial");
        } else if inner.state == CircuitState::Closed {
            inner.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(self.clock.now());

        let opens = if trial {
            inner.trial_in_flight = false;
            true
        } else {
            inner.state == CircuitState::Closed
                && inner.consecutive_failures >= self.config.threshold
        };

        if opens {
            inner.state = CircuitState::Open;
            metrics::record_circuit_opened(&self.operation);
            warn!(
                operation = %self.operation,
                consecutive_failures = inner.consecutive_failures,
                "circuit opened"
            );
        }
    }

    fn release_trial(&self) {
        self.lock().trial_in_flight = false;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The critical sections never panic; recover the data if one did.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Admission to run one call through a breaker.
#[derive(Debug)]
#[must_use = "a permit must be settled with succeed() or fail()"]
pub struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is the half-open trial.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// The call succeeded (or failed for reasons unrelated to downstream health).
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success(self.trial);
    }

    /// The call failed.
    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial();
        }
    }
}
