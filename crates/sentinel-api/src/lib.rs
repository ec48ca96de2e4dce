//! Sentinel HTTP API.
//!
//! Exposes the event worker trigger, breaker inspection and the organization
//! routes. The binary in `main.rs` wires these to `PostgreSQL`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod routes;
pub mod state;
