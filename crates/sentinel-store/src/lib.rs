//! `PostgreSQL` adapters for the Sentinel store ports.

pub mod pg_store;
