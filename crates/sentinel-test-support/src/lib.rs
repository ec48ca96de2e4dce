//! Shared test doubles for the Sentinel execution layer.

mod clock;
mod handlers;
mod limiter;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use handlers::{FailingHandler, RecordingHandler};
pub use limiter::DenyAllRateLimiter;
pub use store::InMemoryStore;
