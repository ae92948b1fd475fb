//! Test observers: recording and failing `EventHandler` implementations.

use std::sync::Mutex;

use async_trait::async_trait;
use ledgerline_core::error::DomainError;
use ledgerline_core::event::DomainEvent;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::observer::EventHandler;

/// Records `(tenant, aggregate, sequence number)` for every handled event.
#[derive(Debug)]
pub struct RecordingHandler {
    name: String,
    seen: Mutex<Vec<(TenantId, AggregateId, i64)>>,
}

impl RecordingHandler {
    /// Creates a handler reporting itself as `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Everything handled so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seen(&self) -> Vec<(TenantId, AggregateId, i64)> {
        self.seen.lock().unwrap().clone()
    }

    /// Sequence numbers handled so far, in order.
    pub fn sequence_numbers(&self) -> Vec<i64> {
        self.seen().into_iter().map(|(_, _, n)| n).collect()
    }
}

#[async_trait]
impl<E: DomainEvent> EventHandler<E> for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        event: &E,
        aggregate_id: AggregateId,
        tenant_id: TenantId,
    ) -> Result<(), DomainError> {
        self.seen.lock().unwrap().push((
            tenant_id,
            aggregate_id,
            event.metadata().sequence_number,
        ));
        Ok(())
    }
}

/// Fails every event.
#[derive(Debug)]
pub struct FailingHandler {
    name: String,
}

impl FailingHandler {
    /// Creates a handler reporting itself as `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

#[async_trait]
impl<E: DomainEvent> EventHandler<E> for FailingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        _event: &E,
        _aggregate_id: AggregateId,
        _tenant_id: TenantId,
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure(format!("{} is down", self.name)))
    }
}
