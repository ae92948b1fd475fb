//! Observer contracts for post-commit and replay dispatch.

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::ids::{AggregateId, TenantId};

/// The three observer categories, in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverCategory {
    /// Generic domain observers.
    DomainObserver,
    /// Writers that maintain queryable projections.
    ReadModelWriter,
    /// Emitters that may trigger downstream commands or notifications.
    SystemEventEmitter,
}

impl ObserverCategory {
    /// All categories in dispatch order.
    pub const ALL: [Self; 3] = [
        Self::DomainObserver,
        Self::ReadModelWriter,
        Self::SystemEventEmitter,
    ];
}

impl fmt::Display for ObserverCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DomainObserver => f.write_str("domain_observer"),
            Self::ReadModelWriter => f.write_str("read_model_writer"),
            Self::SystemEventEmitter => f.write_str("system_event_emitter"),
        }
    }
}

/// Per-event callback implemented by observers, read-model writers and
/// system-event emitters.
///
/// A given event may be delivered more than once across retries and
/// replays, so implementations must be idempotent.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync {
    /// Stable name used in logs and failure reports.
    fn name(&self) -> &str;

    /// Handles one committed or replayed event.
    async fn handle(
        &self,
        event: &E,
        aggregate_id: AggregateId,
        tenant_id: TenantId,
    ) -> Result<(), DomainError>;
}

/// One failed observer invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObserverFailure {
    /// Observer name.
    pub observer: String,
    /// Observer category.
    pub category: ObserverCategory,
    /// Sequence number of the event being handled.
    pub sequence_number: i64,
    /// Rendered error.
    pub message: String,
}

/// Outcome of dispatching one or more events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Successful observer invocations.
    pub delivered: usize,
    /// Failed observer invocations, in dispatch order.
    pub failures: Vec<ObserverFailure>,
}

impl DispatchReport {
    /// Returns `true` if no invocation failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Folds `other` into this report.
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }

    /// Converts a report with failures into `DomainError::DispatchFailure`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::DispatchFailure` carrying this report if any
    /// invocation failed.
    pub fn into_result(self) -> Result<usize, DomainError> {
        if self.is_success() {
            Ok(self.delivered)
        } else {
            Err(DomainError::DispatchFailure(self))
        }
    }
}
