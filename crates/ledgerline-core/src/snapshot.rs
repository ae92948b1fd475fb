//! Snapshot store abstraction.
//!
//! Snapshots bound replay cost and nothing else: loading an aggregate without
//! any snapshot must yield the same state as loading through one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::ids::{AggregateId, TenantId};

/// A checkpoint of aggregate state at a known version.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Tenant owning the aggregate.
    pub tenant_id: TenantId,
    /// Aggregate the state belongs to.
    pub aggregate_id: AggregateId,
    /// Sequence number of the last event folded into `state`.
    pub version: i64,
    /// Assembly the state type was written under.
    pub state_assembly_name: String,
    /// Type name the state was written under.
    pub state_type_name: String,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

/// Durable storage of aggregate snapshots.
///
/// Older snapshots may be retained; only the latest is used for loading.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persists a snapshot. Saving a version older than the current latest
    /// keeps the latest pointer unchanged.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError>;

    /// Returns the latest snapshot for an aggregate, if any.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn get_latest_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, DomainError>;

    /// Returns the version of the latest snapshot, or 0 if there is none.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn latest_snapshot_version(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<i64, DomainError> {
        Ok(self
            .get_latest_snapshot(tenant_id, aggregate_id)
            .await?
            .map_or(0, |snapshot| snapshot.version))
    }
}
