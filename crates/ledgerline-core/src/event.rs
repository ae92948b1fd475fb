//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::ids::{AggregateId, TenantId};
use crate::type_registry::TypeDescriptor;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Tenant owning the aggregate.
    pub tenant_id: TenantId,
    /// Aggregate/stream this event belongs to.
    pub aggregate_id: AggregateId,
    /// 1-based, gapless position within the aggregate stream.
    pub sequence_number: i64,
    /// Correlation ID for tracing a command through its effects.
    pub correlation_id: Uuid,
    /// Causation ID linking this event to the event/command that caused it.
    pub causation_id: Uuid,
    /// User on whose behalf the event was raised, if any.
    pub performing_user_id: Option<Uuid>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Trait that all domain events implement.
///
/// Each aggregate type defines a closed set of event variants. The stored
/// type identity is resolved through the [`TypeRegistry`] first; only then is
/// [`from_payload`](DomainEvent::from_payload) asked to deserialize the
/// payload for that resolved type.
///
/// [`TypeRegistry`]: crate::type_registry::TypeRegistry
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the current type identity of this event variant.
    fn event_type(&self) -> TypeDescriptor;

    /// Serializes the event payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if serialization fails.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError>;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;

    /// Rebuilds an event from a payload whose type has already been bound.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnresolvableType` if `binding` is not one of this
    /// event set's variants, or `DomainError::Infrastructure` if the payload
    /// does not deserialize.
    fn from_payload(
        binding: &TypeDescriptor,
        metadata: EventMetadata,
        payload: serde_json::Value,
    ) -> Result<Self, DomainError>
    where
        Self: Sized;
}
