//! Event store database schema.

use ledgerline_core::error::DomainError;
use sqlx::PgPool;

/// SQL creating the event, snapshot and snapshot-head tables.
///
/// The unique key on `(tenant_id, aggregate_id, sequence_number)` is the
/// conditional write that backs optimistic concurrency.
pub const CREATE_EVENT_STORE_SCHEMA: &str =
    include_str!("../../../migrations/20260101000000_event_store.sql");

/// Creates the event store tables if they do not already exist.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the DDL fails.
pub async fn apply(pool: &PgPool) -> Result<(), DomainError> {
    sqlx::raw_sql(CREATE_EVENT_STORE_SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| DomainError::Infrastructure(format!("schema migration failed: {e}")))?;
    tracing::info!("event store schema applied");
    Ok(())
}
