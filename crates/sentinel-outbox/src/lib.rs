//! Transactional outbox for Sentinel.
//!
//! [`writer::OutboxWriter`] records events inside the caller's store
//! transaction; [`worker::EventWorker`] delivers them to registered handlers
//! in bounded, repeatable batches.

pub mod handler;
pub mod metrics;
pub mod policy;
pub mod worker;
pub mod writer;
