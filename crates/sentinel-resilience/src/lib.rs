//! Sentinel Resilience: the guarded execution layer.
//!
//! Every domain mutation runs through [`executor::GuardedExecutor`], which
//! checks the caller's rate limit, consults the operation's circuit breaker,
//! races the work against a deadline and converts every outcome into
//! `Result<T, AppError>`.

pub mod circuit_breaker;
pub mod executor;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod timeout;
