//! Shared test doubles and fixtures for Ledgerline.

mod clock;
mod fixtures;
mod observers;
mod stores;

pub use clock::FixedClock;
pub use fixtures::{TALLY_ASSEMBLY, Tally, TallyEvent, TallyEventKind, TallyState, tally_registry};
pub use observers::{FailingHandler, RecordingHandler};
pub use stores::{FailingEventStore, FailingSnapshotStore, RecordingEventStore};
