//! Application layer for the organization context.

pub mod command_handlers;
