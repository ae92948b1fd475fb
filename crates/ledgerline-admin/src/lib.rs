//! Ledgerline administrative tooling.
//!
//! Exposes the schema setup and the
//! `ReplayAllEventsForAggregateEntity` entry point as a command line tool.

pub mod cli;
pub mod error;
pub mod runner;
