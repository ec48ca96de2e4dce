//! Domain layer for the organization context.

pub mod commands;
pub mod events;
pub mod model;
