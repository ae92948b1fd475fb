//! Aggregate root abstraction.

use crate::error::DomainError;
use crate::event::DomainEvent;
use crate::ids::{AggregateId, TenantId};
use crate::type_registry::TypeDescriptor;

/// Trait for aggregate roots that reconstitute from event history.
///
/// Domain methods raise events by applying them immediately and buffering
/// them as uncommitted, so `version()` always counts uncommitted events too.
/// Reconstitution goes through [`apply`](AggregateRoot::apply) alone, which
/// never touches the buffer; a freshly loaded aggregate therefore has no
/// uncommitted events.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Entity type name used to route administrative replays.
    const ENTITY_TYPE: &'static str;

    /// Creates an empty aggregate at version 0.
    fn new(tenant_id: TenantId, aggregate_id: AggregateId) -> Self;

    /// Returns the owning tenant.
    fn tenant_id(&self) -> TenantId;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> AggregateId;

    /// Returns the sequence number of the last applied event.
    fn version(&self) -> i64;

    /// Applies an event, mutating state and incrementing the version.
    fn apply(&mut self, event: &Self::Event);

    /// Returns events raised since the last commit, in order.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn mark_committed(&mut self);
}

/// Aggregates whose state can be checkpointed into a snapshot.
pub trait Snapshotting: AggregateRoot {
    /// The current type identity of the serialized state.
    fn state_type() -> TypeDescriptor;

    /// Serializes the current state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    fn snapshot_state(&self) -> Result<serde_json::Value, DomainError>;

    /// Rebuilds an aggregate at `version` from serialized state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the state does not deserialize.
    fn from_snapshot(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        version: i64,
        state: serde_json::Value,
    ) -> Result<Self, DomainError>;
}
