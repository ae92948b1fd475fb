//! Event record store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::EventMetadata;
use crate::ids::{AggregateId, TenantId};

/// Page size used when loading events without an explicit batch size.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Tenant owning the aggregate.
    pub tenant_id: TenantId,
    /// Aggregate this event belongs to.
    pub aggregate_id: AggregateId,
    /// 1-based, gapless sequence number within the aggregate stream.
    pub sequence_number: i64,
    /// Assembly the event type was written under.
    pub stored_assembly_name: String,
    /// Type name the event was written under.
    pub stored_type_name: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Causation ID linking to the causing event/command.
    pub causation_id: Uuid,
    /// User on whose behalf the event was raised, if any.
    pub performing_user_id: Option<Uuid>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Extracts the envelope metadata.
    #[must_use]
    pub fn metadata(&self) -> EventMetadata {
        EventMetadata {
            event_id: self.event_id,
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
            sequence_number: self.sequence_number,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            performing_user_id: self.performing_user_id,
            occurred_at: self.occurred_at,
        }
    }
}

/// Durable, append-only storage of per-aggregate event sequences.
///
/// Every operation is scoped by tenant and aggregate.
#[async_trait]
pub trait EventRecordStore: Send + Sync {
    /// Appends `events` atomically if the stored version equals
    /// `expected_version`, returning the new version.
    ///
    /// An empty batch is a no-op that returns `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stored version
    /// differs from `expected_version`, `DomainError::Validation` if the batch
    /// is not a contiguous continuation of the stream, and
    /// `DomainError::Infrastructure` on storage failure.
    async fn append_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError>;

    /// Loads up to `limit` events with `sequence_number > from_version_exclusive`,
    /// in ascending sequence order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure.
    async fn load_events_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        from_version_exclusive: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError>;
}

/// Checks that `events` continue the stream at `expected_version + 1` without
/// gaps and all belong to the addressed tenant and aggregate.
///
/// # Errors
///
/// Returns `DomainError::Validation` describing the first offending record.
pub fn validate_batch(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    if expected_version < 0 {
        return Err(DomainError::Validation(format!(
            "expected version must not be negative, got {expected_version}"
        )));
    }
    let mut next = expected_version + 1;
    for event in events {
        if event.tenant_id != tenant_id || event.aggregate_id != aggregate_id {
            return Err(DomainError::Validation(format!(
                "event {} does not belong to aggregate {aggregate_id} of tenant {tenant_id}",
                event.event_id
            )));
        }
        if event.sequence_number != next {
            return Err(DomainError::Validation(format!(
                "event {} has sequence number {}, expected {next}",
                event.event_id, event.sequence_number
            )));
        }
        next += 1;
    }
    Ok(())
}

/// Lazy, ordered, finite and restartable sequence of an aggregate's events.
///
/// Events are fetched one page at a time. Each page is checked for
/// contiguity, so a gap in storage surfaces as an error rather than a
/// silently skipped event.
pub struct EventStream<'a> {
    store: &'a dyn EventRecordStore,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    start: i64,
    cursor: i64,
    page_size: usize,
    exhausted: bool,
}

impl<'a> EventStream<'a> {
    /// Creates a stream over events after `from_version_exclusive`.
    #[must_use]
    pub fn new(
        store: &'a dyn EventRecordStore,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        from_version_exclusive: i64,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            tenant_id,
            aggregate_id,
            start: from_version_exclusive,
            cursor: from_version_exclusive,
            page_size: page_size.max(1),
            exhausted: false,
        }
    }

    /// Sequence number of the last event yielded so far.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.cursor
    }

    /// Rewinds to the version the stream was created at.
    pub fn restart(&mut self) {
        self.cursor = self.start;
        self.exhausted = false;
    }

    /// Fetches the next page, or `None` once the stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` on storage failure or if the
    /// stored sequence has a gap.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<StoredEvent>>, DomainError> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self
            .store
            .load_events_page(self.tenant_id, self.aggregate_id, self.cursor, self.page_size)
            .await?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if page.is_empty() {
            return Ok(None);
        }
        for event in &page {
            let expected = self.cursor + 1;
            if event.sequence_number != expected {
                return Err(DomainError::Infrastructure(format!(
                    "event stream for aggregate {} has a gap: expected sequence {expected}, found {}",
                    self.aggregate_id, event.sequence_number
                )));
            }
            self.cursor = expected;
        }
        Ok(Some(page))
    }

    /// Drains the remaining events into a single vector.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`next_batch`](Self::next_batch).
    pub async fn collect_remaining(&mut self) -> Result<Vec<StoredEvent>, DomainError> {
        let mut events = Vec::new();
        while let Some(batch) = self.next_batch().await? {
            events.extend(batch);
        }
        Ok(events)
    }
}

/// Returns a stream over the events after `from_version_exclusive`.
#[must_use]
pub fn load_events(
    store: &dyn EventRecordStore,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    from_version_exclusive: i64,
) -> EventStream<'_> {
    EventStream::new(
        store,
        tenant_id,
        aggregate_id,
        from_version_exclusive,
        DEFAULT_PAGE_SIZE,
    )
}

/// Returns a stream over the complete history of an aggregate.
#[must_use]
pub fn load_all_events(
    store: &dyn EventRecordStore,
    tenant_id: TenantId,
    aggregate_id: AggregateId,
) -> EventStream<'_> {
    load_events(store, tenant_id, aggregate_id, 0)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Minimal store returning a fixed event list, counting page requests.
    struct FixedStore {
        events: Vec<StoredEvent>,
        page_requests: Mutex<usize>,
    }

    #[async_trait]
    impl EventRecordStore for FixedStore {
        async fn append_events(
            &self,
            _tenant_id: TenantId,
            _aggregate_id: AggregateId,
            expected_version: i64,
            _events: &[StoredEvent],
        ) -> Result<i64, DomainError> {
            Ok(expected_version)
        }

        async fn load_events_page(
            &self,
            _tenant_id: TenantId,
            _aggregate_id: AggregateId,
            from_version_exclusive: i64,
            limit: usize,
        ) -> Result<Vec<StoredEvent>, DomainError> {
            *self.page_requests.lock().unwrap() += 1;
            Ok(self
                .events
                .iter()
                .filter(|e| e.sequence_number > from_version_exclusive)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    fn event(tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            tenant_id,
            aggregate_id,
            sequence_number,
            stored_assembly_name: "test".to_owned(),
            stored_type_name: "TestEvent".to_owned(),
            payload: serde_json::json!({}),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            performing_user_id: None,
            occurred_at: Utc::now(),
        }
    }

    fn store_with(sequence_numbers: &[i64]) -> (FixedStore, TenantId, AggregateId) {
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        let events = sequence_numbers
            .iter()
            .map(|&n| event(tenant_id, aggregate_id, n))
            .collect();
        (
            FixedStore {
                events,
                page_requests: Mutex::new(0),
            },
            tenant_id,
            aggregate_id,
        )
    }

    #[tokio::test]
    async fn test_stream_pages_through_all_events_in_order() {
        // Arrange
        let (store, tenant_id, aggregate_id) = store_with(&[1, 2, 3, 4, 5]);
        let mut stream = EventStream::new(&store, tenant_id, aggregate_id, 0, 2);

        // Act
        let mut batches = Vec::new();
        while let Some(batch) = stream.next_batch().await.unwrap() {
            batches.push(batch.iter().map(|e| e.sequence_number).collect::<Vec<_>>());
        }

        // Assert
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(stream.position(), 5);
        assert_eq!(*store.page_requests.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stream_starts_after_requested_version() {
        let (store, tenant_id, aggregate_id) = store_with(&[1, 2, 3]);

        let events = load_events(&store, tenant_id, aggregate_id, 2)
            .collect_remaining()
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence_number, 3);
    }

    #[tokio::test]
    async fn test_stream_restart_replays_from_start() {
        let (store, tenant_id, aggregate_id) = store_with(&[1, 2, 3]);
        let mut stream = load_all_events(&store, tenant_id, aggregate_id);
        let first = stream.collect_remaining().await.unwrap();

        stream.restart();
        let second = stream.collect_remaining().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_stream_reports_gap_as_infrastructure_error() {
        let (store, tenant_id, aggregate_id) = store_with(&[1, 2, 4]);

        let result = load_all_events(&store, tenant_id, aggregate_id)
            .collect_remaining()
            .await;

        match result {
            Err(DomainError::Infrastructure(msg)) => assert!(msg.contains("gap")),
            other => panic!("expected Infrastructure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_stream_yields_nothing() {
        let (store, tenant_id, aggregate_id) = store_with(&[]);
        let mut stream = load_all_events(&store, tenant_id, aggregate_id);

        assert!(stream.next_batch().await.unwrap().is_none());
        assert!(stream.next_batch().await.unwrap().is_none());
    }

    #[test]
    fn test_validate_batch_accepts_contiguous_continuation() {
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        let events = vec![event(tenant_id, aggregate_id, 3), event(tenant_id, aggregate_id, 4)];

        assert!(validate_batch(tenant_id, aggregate_id, 2, &events).is_ok());
    }

    #[test]
    fn test_validate_batch_rejects_gap() {
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        let events = vec![event(tenant_id, aggregate_id, 1), event(tenant_id, aggregate_id, 3)];

        let result = validate_batch(tenant_id, aggregate_id, 0, &events);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_validate_batch_rejects_foreign_tenant() {
        let aggregate_id = AggregateId::new();
        let events = vec![event(TenantId::new(), aggregate_id, 1)];

        let result = validate_batch(TenantId::new(), aggregate_id, 0, &events);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
