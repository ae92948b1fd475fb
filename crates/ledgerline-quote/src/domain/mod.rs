//! Domain model for quotes.

pub mod aggregates;
pub mod commands;
pub mod events;
