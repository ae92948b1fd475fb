//! Test stores: mock `EventRecordStore` and `SnapshotStore` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::repository::{EventRecordStore, StoredEvent};
use ledgerline_core::snapshot::{Snapshot, SnapshotStore};

/// An event store that records every call. `load_events_page` serves the
/// configured events; `append_events` always succeeds.
#[derive(Debug, Default)]
pub struct RecordingEventStore {
    events: Vec<StoredEvent>,
    appended: Mutex<Vec<(AggregateId, i64, Vec<StoredEvent>)>>,
    load_calls: Mutex<usize>,
}

impl RecordingEventStore {
    /// Creates a store that serves `events` from every load.
    #[must_use]
    pub fn new(events: Vec<StoredEvent>) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    /// Returns all appended batches as `(aggregate, expected version, events)`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn appended_events(&self) -> Vec<(AggregateId, i64, Vec<StoredEvent>)> {
        self.appended.lock().unwrap().clone()
    }

    /// Number of `load_events_page` calls so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn load_calls(&self) -> usize {
        *self.load_calls.lock().unwrap()
    }
}

#[async_trait]
impl EventRecordStore for RecordingEventStore {
    async fn append_events(
        &self,
        _tenant_id: TenantId,
        aggregate_id: AggregateId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        self.appended
            .lock()
            .unwrap()
            .push((aggregate_id, expected_version, events.to_vec()));
        Ok(expected_version + i64::try_from(events.len()).unwrap())
    }

    async fn load_events_page(
        &self,
        _tenant_id: TenantId,
        _aggregate_id: AggregateId,
        from_version_exclusive: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        *self.load_calls.lock().unwrap() += 1;
        Ok(self
            .events
            .iter()
            .filter(|e| e.sequence_number > from_version_exclusive)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// An event store that always returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventRecordStore for FailingEventStore {
    async fn append_events(
        &self,
        _tenant_id: TenantId,
        _aggregate_id: AggregateId,
        _expected_version: i64,
        _events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }

    async fn load_events_page(
        &self,
        _tenant_id: TenantId,
        _aggregate_id: AggregateId,
        _from_version_exclusive: i64,
        _limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("connection refused".into()))
    }
}

/// A snapshot store that has no snapshots and fails every save.
#[derive(Debug)]
pub struct FailingSnapshotStore;

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn save_snapshot(&self, _snapshot: Snapshot) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("snapshot storage unavailable".into()))
    }

    async fn get_latest_snapshot(
        &self,
        _tenant_id: TenantId,
        _aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, DomainError> {
        Ok(None)
    }
}
