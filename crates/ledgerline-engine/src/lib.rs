//! Ledgerline Engine: loading, saving and replaying aggregates.
//!
//! Wires the core store traits into an aggregate repository with snapshot
//! cadence and post-commit dispatch, a replay orchestrator for rebuilding
//! projections, and the read/write intent interceptor.

pub mod cancellation;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod guard;
pub mod replay;
pub mod repository;
pub mod retry;
