//! Ledgerline Event Store: storage backends.
//!
//! PostgreSQL implementations of the event record and snapshot stores, plus
//! in-memory equivalents with the same concurrency semantics for tests and
//! embedded use.

pub mod memory;
pub mod pg_event_store;
pub mod pg_snapshot_store;
pub mod schema;

pub use memory::{InMemoryEventStore, InMemorySnapshotStore};
pub use pg_event_store::PgEventStore;
pub use pg_snapshot_store::PgSnapshotStore;
