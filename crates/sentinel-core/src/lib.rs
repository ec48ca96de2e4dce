//! Sentinel Core: shared abstractions for guarded execution and the event outbox.
//!
//! This crate defines the error model, the persisted event record and the
//! store ports every other crate depends on. It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod event;
pub mod store;
pub mod trace;
