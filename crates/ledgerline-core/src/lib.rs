//! Ledgerline Core: event-sourcing abstractions.
//!
//! This crate defines the identifiers, event envelope, aggregate and store
//! contracts, and the type registry that every other Ledgerline crate builds
//! on. It contains no infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod ids;
pub mod intent;
pub mod observer;
pub mod repository;
pub mod snapshot;
pub mod type_registry;
