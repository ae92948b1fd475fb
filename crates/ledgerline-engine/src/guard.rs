//! Read/write intent interceptor.
//!
//! Every command or query passes through [`intercept`] with the request's
//! [`RequestScope`]. The first operation tags the scope; a `ReadWrite`
//! operation inside a scope tagged `ReadOnly` fails before its handler runs.
//! [`ScopedEventStore`] applies the same check at the append boundary for
//! writes that bypass the pipeline.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use ledgerline_core::command::Command;
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::intent::RequestScope;
use ledgerline_core::repository::{EventRecordStore, StoredEvent};
use tracing::{debug, warn};

/// Admits `command` into `scope` and runs `next` if allowed.
///
/// # Errors
///
/// Returns `DomainError::InvalidOperation` without calling `next` if the
/// command would write inside a read-only scope; otherwise whatever `next`
/// returns.
pub async fn intercept<C, T, F, Fut>(
    scope: &RequestScope,
    command: &C,
    next: F,
) -> Result<T, DomainError>
where
    C: Command + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let intent = command.intent();
    if let Err(err) = scope.enter(intent) {
        warn!(
            request_id = %scope.request_id(),
            command = command.command_type(),
            correlation_id = %command.correlation_id(),
            %intent,
            "command rejected by read-only scope"
        );
        return Err(err);
    }
    debug!(
        request_id = %scope.request_id(),
        command = command.command_type(),
        %intent,
        "command admitted"
    );
    next().await
}

/// Event store wrapper that refuses appends from a read-only scope.
pub struct ScopedEventStore {
    inner: Arc<dyn EventRecordStore>,
    scope: Arc<RequestScope>,
}

impl ScopedEventStore {
    /// Wraps `inner` for the lifetime of `scope`.
    #[must_use]
    pub fn new(inner: Arc<dyn EventRecordStore>, scope: Arc<RequestScope>) -> Self {
        Self { inner, scope }
    }
}

#[async_trait]
impl EventRecordStore for ScopedEventStore {
    async fn append_events(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<i64, DomainError> {
        self.scope.ensure_writable()?;
        self.inner
            .append_events(tenant_id, aggregate_id, expected_version, events)
            .await
    }

    async fn load_events_page(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        from_version_exclusive: i64,
        limit: usize,
    ) -> Result<Vec<StoredEvent>, DomainError> {
        self.inner
            .load_events_page(tenant_id, aggregate_id, from_version_exclusive, limit)
            .await
    }
}
