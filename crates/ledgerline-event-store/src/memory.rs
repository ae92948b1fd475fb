//! In-memory event and snapshot stores.
//!
//! The version check and the append happen under one lock, which gives the
//! same conditional-write semantics as the unique key in PostgreSQL.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::repository::{EventRecordStore, StoredEvent, validate_batch};
use ledgerline_core::snapshot::{Snapshot, SnapshotStore};

type StreamKey = (TenantId, AggregateId);

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, DomainError> {
    mutex
        .lock()
        .map_err(|_| DomainError::Infrastructure(format!("{what} lock poisoned")))
}

/// Event record store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<StreamKey, Vec<StoredEvent>>>,
}

impl InMemoryEventStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events stored for an aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn stream_len(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<usize, DomainError> {
        let streams = lock(&self.streams, "event store")?;
        Ok(streams.get(&(tenant_id, aggregate_id)).map_or(0, Vec::len))
    }
}

#[async_trait]
impl EventRecordStore for InMemoryEventStore {
    async fn append_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        validate_batch(tenant_id, aggregate_id, expected_version, events)?;
        if events.is_empty() {
            return Ok(expected_version);
        }

        let mut streams = lock(&self.streams, "event store")?;
        let stream = streams.entry((tenant_id, aggregate_id)).or_default();
        let actual = stream.last().map_or(0, |e| e.sequence_number);
        if actual != expected_version {
            tracing::warn!(%aggregate_id, expected = expected_version, actual, "concurrency conflict on append");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        stream.extend_from_slice(events);
        let new_version = stream.last().map_or(0, |e| e.sequence_number);
        tracing::debug!(%tenant_id, %aggregate_id, new_version, "events appended");
        Ok(new_version)
    }

    async fn load_events_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        from_version_exclusive: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        let streams = lock(&self.streams, "event store")?;
        Ok(streams
            .get(&(tenant_id, aggregate_id))
            .map(|stream| {
                stream
                    .iter()
                    .filter(|e| e.sequence_number > from_version_exclusive)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Snapshot store held in process memory. Retains every snapshot.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<StreamKey, BTreeMap<i64, Snapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Versions of all retained snapshots for an aggregate, ascending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn snapshot_versions(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Vec<i64>, DomainError> {
        let snapshots = lock(&self.snapshots, "snapshot store")?;
        Ok(snapshots
            .get(&(tenant_id, aggregate_id))
            .map(|history| history.keys().copied().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut snapshots = lock(&self.snapshots, "snapshot store")?;
        snapshots
            .entry((snapshot.tenant_id, snapshot.aggregate_id))
            .or_default()
            .insert(snapshot.version, snapshot);
        Ok(())
    }

    async fn get_latest_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, DomainError> {
        let snapshots = lock(&self.snapshots, "snapshot store")?;
        Ok(snapshots
            .get(&(tenant_id, aggregate_id))
            .and_then(|history| history.values().next_back().cloned()))
    }
}
