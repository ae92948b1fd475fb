//! `PostgreSQL` implementation of the `EventRecordStore` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::repository::{EventRecordStore, StoredEvent, validate_batch};

/// Unique key on `(tenant_id, aggregate_id, sequence_number)`.
const STREAM_SEQUENCE_KEY: &str = "event_records_stream_sequence_key";

const INSERT_EVENT: &str = r"
INSERT INTO event_records (
    event_id, tenant_id, aggregate_id, sequence_number,
    stored_assembly_name, stored_type_name, payload,
    correlation_id, causation_id, performing_user_id, occurred_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
";

const SELECT_EVENTS_PAGE: &str = r"
SELECT event_id, tenant_id, aggregate_id, sequence_number,
       stored_assembly_name, stored_type_name, payload,
       correlation_id, causation_id, performing_user_id, occurred_at
FROM event_records
WHERE tenant_id = $1 AND aggregate_id = $2 AND sequence_number > $3
ORDER BY sequence_number ASC
LIMIT $4
";

const SELECT_CURRENT_VERSION: &str = r"
SELECT COALESCE(MAX(sequence_number), 0)
FROM event_records
WHERE tenant_id = $1 AND aggregate_id = $2
";

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    tenant_id: Uuid,
    aggregate_id: Uuid,
    sequence_number: i64,
    stored_assembly_name: String,
    stored_type_name: String,
    payload: serde_json::Value,
    correlation_id: Uuid,
    causation_id: Uuid,
    performing_user_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            event_id: row.event_id,
            tenant_id: TenantId::from_uuid(row.tenant_id),
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            sequence_number: row.sequence_number,
            stored_assembly_name: row.stored_assembly_name,
            stored_type_name: row.stored_type_name,
            payload: row.payload,
            correlation_id: row.correlation_id,
            causation_id: row.causation_id,
            performing_user_id: row.performing_user_id,
            occurred_at: row.occurred_at,
        }
    }
}

fn infrastructure(err: &sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {err}"))
}

fn is_sequence_conflict(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| {
        db.is_unique_violation() && names_sequence_key(db.constraint())
    })
}

// A reused event id also violates uniqueness; only the sequence key is a race.
fn names_sequence_key(constraint: Option<&str>) -> bool {
    constraint == Some(STREAM_SEQUENCE_KEY)
}

async fn current_version<'e>(
    executor: impl PgExecutor<'e>,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> Result<i64, DomainError> {
    sqlx::query_scalar(SELECT_CURRENT_VERSION)
        .bind(tenant_id.as_uuid())
        .bind(aggregate_id.as_uuid())
        .fetch_one(executor)
        .await
        .map_err(|e| infrastructure(&e))
}

/// PostgreSQL-backed event record store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn conflict(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        expected: i64,
    ) -> DomainError {
        match current_version(&self.pool, tenant_id, aggregate_id).await {
            Ok(actual) => {
                tracing::warn!(%aggregate_id, expected, actual, "concurrency conflict on append");
                DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                }
            }
            Err(err) => err,
        }
    }
}

#[async_trait]
impl EventRecordStore for PgEventStore {
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
        let count = i64::try_from(events.len())
            .map_err(|_| DomainError::Validation("event batch too large".into()))?;

        let mut tx = self.pool.begin().await.map_err(|e| infrastructure(&e))?;

        let actual = current_version(&mut *tx, tenant_id, aggregate_id).await?;
        if actual != expected_version {
            tracing::warn!(%aggregate_id, expected = expected_version, actual, "concurrency conflict on append");
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let inserted = sqlx::query(INSERT_EVENT)
                .bind(event.event_id)
                .bind(tenant_id.as_uuid())
                .bind(aggregate_id.as_uuid())
                .bind(event.sequence_number)
                .bind(&event.stored_assembly_name)
                .bind(&event.stored_type_name)
                .bind(&event.payload)
                .bind(event.correlation_id)
                .bind(event.causation_id)
                .bind(event.performing_user_id)
                .bind(event.occurred_at)
                .execute(&mut *tx)
                .await;

            if let Err(err) = inserted {
                // A concurrent writer committed the same sequence number
                // between our version check and this insert.
                if is_sequence_conflict(&err) {
                    drop(tx);
                    return Err(self.conflict(tenant_id, aggregate_id, expected_version).await);
                }
                return Err(infrastructure(&err));
            }
        }

        if let Err(err) = tx.commit().await {
            if is_sequence_conflict(&err) {
                return Err(self.conflict(tenant_id, aggregate_id, expected_version).await);
            }
            return Err(infrastructure(&err));
        }

        let new_version = expected_version + count;
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
        let rows: Vec<EventRow> = sqlx::query_as(SELECT_EVENTS_PAGE)
            .bind(tenant_id.as_uuid())
            .bind(aggregate_id.as_uuid())
            .bind(from_version_exclusive)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| infrastructure(&e))?;

        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }
}
