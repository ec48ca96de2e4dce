//! Deadline race around a single future.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Default deadline for guarded operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// The deadline won the race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation timed out after {} ms", .0.as_millis())]
pub struct Elapsed(pub Duration);

/// Races `fut` against `deadline`; only the first to settle counts.
///
/// On expiry the future is dropped and its eventual result discarded. Work it
/// already handed to other tasks or the network is not cancelled.
///
/// # Errors
///
/// Returns [`Elapsed`] if `deadline` passes before `fut` completes.
pub async fn with_timeout<F>(deadline: Duration, fut: F) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| Elapsed(deadline))
}
