//! Application layer: command and query handlers and projections.

pub mod command_handlers;
pub mod projections;
pub mod query_handlers;
