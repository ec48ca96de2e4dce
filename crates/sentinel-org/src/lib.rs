//! Organization membership context.
//!
//! Invites and memberships are stored as documents; every mutation records
//! its outbox event in the same transaction and runs as a guarded operation.

pub mod application;
pub mod domain;
