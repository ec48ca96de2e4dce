//! The guarded operation executor.
//!
//! `execute` is the single place where failures become [`AppError`]s:
//! 1. unless skipped, the caller's rate limit is checked (rejection never
//!    touches the breaker);
//! 2. the operation's breaker is resolved from the shared registry;
//! 3. the work runs through the breaker, raced against its deadline;
//! 4. the outcome is logged, counted and returned as `Result<T, AppError>`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sentinel_core::error::{AppError, ErrorCode, ServiceError};
use sentinel_core::trace;
use tracing::{error, info, instrument, warn};

use crate::circuit_breaker::BreakerError;
use crate::metrics;
use crate::rate_limit::{ANONYMOUS_CALLER, RateLimitDecision, RateLimiter};
use crate::registry::CircuitBreakerRegistry;
use crate::timeout::DEFAULT_TIMEOUT;

/// Executor-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Deadline used when a call does not set its own.
    pub default_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Overrides the default deadline.
    pub timeout: Option<Duration>,
    /// Bypasses the rate limiter (internal or already-admitted callers).
    pub skip_rate_limit: bool,
    /// Identity the rate limiter keys on; defaults to [`ANONYMOUS_CALLER`].
    pub caller_key: Option<String>,
}

impl ExecuteOptions {
    /// Sets the deadline.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skips the rate limiter.
    #[must_use]
    pub fn skip_rate_limit(mut self) -> Self {
        self.skip_rate_limit = true;
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn caller(mut self, key: impl Into<String>) -> Self {
        self.caller_key = Some(key.into());
        self
    }
}

/// Wraps domain service calls with rate limiting, circuit breaking and a
/// deadline. Holds no per-call state.
#[derive(Clone)]
pub struct GuardedExecutor {
    config: ExecutorConfig,
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl std::fmt::Debug for GuardedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedExecutor")
            .field("config", &self.config)
            .field("breakers", &self.breakers)
            .finish_non_exhaustive()
    }
}

impl GuardedExecutor {
    /// Creates an executor over a shared breaker registry.
    #[must_use]
    pub fn new(
        config: ExecutorConfig,
        breakers: Arc<CircuitBreakerRegistry>,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            config,
            breakers,
            rate_limiter,
        }
    }

    /// Executor-wide settings.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The registry this executor resolves breakers from.
    #[must_use]
    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    /// Runs `op` under `operation`'s guards with default options.
    ///
    /// # Errors
    ///
    /// Every failure, including rate limiting, an open circuit and timeouts,
    /// is returned as an [`AppError`]; nothing is thrown past this boundary.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, op: F) -> Result<T, AppError>
    where
        E: Into<ServiceError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with(operation, ExecuteOptions::default(), op)
            .await
    }

    /// Runs `op` under `operation`'s guards.
    ///
    /// # Errors
    ///
    /// See [`GuardedExecutor::execute`].
    #[instrument(skip_all, fields(operation = %operation))]
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        operation: &str,
        options: ExecuteOptions,
        op: F,
    ) -> Result<T, AppError>
    where
        E: Into<ServiceError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let trace_id = trace::current_trace_id();

        if !options.skip_rate_limit {
            let caller = options.caller_key.as_deref().unwrap_or(ANONYMOUS_CALLER);
            if let Some(err) = self.admit(caller, &trace_id).await {
                return Err(self.failed(operation, started, err));
            }
        }

        let breaker = self.breakers.get_or_create(operation);
        let deadline = options.timeout.unwrap_or(self.config.default_timeout);
        let work = trace::scope(trace_id.clone(), async move {
            op().await.map_err(Into::<ServiceError>::into)
        });

        match breaker
            .call(deadline, work, ServiceError::counts_as_breaker_failure)
            .await
        {
            Ok(data) => {
                let elapsed = started.elapsed();
                metrics::record_operation(operation, "success", elapsed);
                info!(
                    operation,
                    duration_ms = duration_millis(elapsed),
                    trace_id = %trace_id,
                    "guarded operation succeeded"
                );
                Ok(data)
            }
            Err(err) => {
                let err = classify(operation, err, trace_id);
                Err(self.failed(operation, started, err))
            }
        }
    }

    /// Returns the rejection, if any. A limiter that cannot answer admits
    /// the call.
    async fn admit(&self, caller: &str, trace_id: &str) -> Option<AppError> {
        match self.rate_limiter.check(caller).await {
            Ok(RateLimitDecision::Allowed) => None,
            Ok(RateLimitDecision::Rejected { retry_after }) => Some(
                AppError::new(
                    ErrorCode::TooManyRequests,
                    "too many requests, retry later",
                    trace_id,
                )
                .with_detail("retryAfterMs", duration_millis(retry_after)),
            ),
            Err(err) => {
                warn!(caller, error = %err, "rate limiter unavailable, admitting call");
                None
            }
        }
    }

    fn failed(&self, operation: &str, started: Instant, err: AppError) -> AppError {
        let elapsed = started.elapsed();
        metrics::record_operation(operation, err.code().as_str(), elapsed);
        if err.code() == ErrorCode::InternalError {
            error!(
                operation,
                duration_ms = duration_millis(elapsed),
                code = %err.code(),
                trace_id = %err.trace_id(),
                error = %err.message(),
                details = ?err.details(),
                "guarded operation failed"
            );
        } else {
            warn!(
                operation,
                duration_ms = duration_millis(elapsed),
                code = %err.code(),
                trace_id = %err.trace_id(),
                error = %err.message(),
                "guarded operation failed"
            );
        }
        err
    }
}

/// Maps breaker-level outcomes to caller-facing failures.
fn classify(operation: &str, err: BreakerError<ServiceError>, trace_id: String) -> AppError {
    match err {
        BreakerError::Inner(service_err) => service_err.into_app_error(trace_id),
        BreakerError::Open => AppError::new(
            ErrorCode::ServiceUnavailable,
            "service temporarily unavailable, please retry later",
            trace_id,
        )
        .with_detail("operation", operation),
        BreakerError::Timeout(after) => {
            AppError::new(ErrorCode::Timeout, "operation timed out", trace_id)
                .with_detail("operation", operation)
                .with_detail("timeoutMs", duration_millis(after))
        }
    }
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
