//! `PostgreSQL` implementation of the `SnapshotStore` trait.
//!
//! Every snapshot is retained in `aggregate_snapshots`; the head table holds
//! the latest version per aggregate and only ever moves forward.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::snapshot::{Snapshot, SnapshotStore};

const UPSERT_SNAPSHOT: &str = r"
INSERT INTO aggregate_snapshots (
    tenant_id, aggregate_id, version, state_assembly_name, state_type_name, state, taken_at
) VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (tenant_id, aggregate_id, version) DO UPDATE SET
    state_assembly_name = EXCLUDED.state_assembly_name,
    state_type_name = EXCLUDED.state_type_name,
    state = EXCLUDED.state,
    taken_at = EXCLUDED.taken_at
";

const ADVANCE_HEAD: &str = r"
INSERT INTO aggregate_snapshot_heads (tenant_id, aggregate_id, latest_version)
VALUES ($1, $2, $3)
ON CONFLICT (tenant_id, aggregate_id) DO UPDATE SET
    latest_version = GREATEST(aggregate_snapshot_heads.latest_version, EXCLUDED.latest_version)
";

const SELECT_LATEST: &str = r"
SELECT s.tenant_id, s.aggregate_id, s.version, s.state_assembly_name,
       s.state_type_name, s.state, s.taken_at
FROM aggregate_snapshot_heads h
JOIN aggregate_snapshots s
  ON s.tenant_id = h.tenant_id
 AND s.aggregate_id = h.aggregate_id
 AND s.version = h.latest_version
WHERE h.tenant_id = $1 AND h.aggregate_id = $2
";

const SELECT_LATEST_VERSION: &str = r"
SELECT latest_version
FROM aggregate_snapshot_heads
WHERE tenant_id = $1 AND aggregate_id = $2
";

#[derive(Debug, sqlx::FromRow)]
struct SnapshotRow {
    tenant_id: Uuid,
    aggregate_id: Uuid,
    version: i64,
    state_assembly_name: String,
    state_type_name: String,
    state: serde_json::Value,
    taken_at: DateTime<Utc>,
}

impl From<SnapshotRow> for Snapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            version: row.version,
            state_assembly_name: row.state_assembly_name,
            state_type_name: row.state_type_name,
            state: row.state,
            taken_at: row.taken_at,
        }
    }
}

fn infrastructure(err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {err}"))
}

/// PostgreSQL-backed snapshot store.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnapshotStore for PgSnapshotStore {
    async fn save_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(|e| infrastructure(&e))?;

        sqlx::query(UPSERT_SNAPSHOT)
            .bind(snapshot.tenant_id.as_uuid())
            .bind(snapshot.aggregate_id.as_uuid())
            .bind(snapshot.version)
            .bind(&snapshot.state_assembly_name)
            .bind(&snapshot.state_type_name)
            .bind(&snapshot.state)
            .bind(snapshot.taken_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;

        sqlx::query(ADVANCE_HEAD)
            .bind(snapshot.tenant_id.as_uuid())
            .bind(snapshot.aggregate_id.as_uuid())
            .bind(snapshot.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| infrastructure(&e))?;

        tx.commit().await.map_err(|e| infrastructure(&e))?;
        tracing::debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "snapshot saved"
        );
        Ok(())
    }

    async fn get_latest_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<Snapshot>, DomainError> {
        let row: Option<SnapshotRow> = sqlx::query_as(SELECT_LATEST)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        Ok(row.map(Snapshot::from))
    }

    async fn latest_snapshot_version(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<i64, DomainError> {
        let version: Option<i64> = sqlx::query_scalar(SELECT_LATEST_VERSION)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;
        Ok(version.unwrap_or(0))
    }
}
