//! Conversion between typed events and stored records.
//!
//! Decoding binds the stored type identity through the registry before the
//! payload is deserialized. Encoding always writes the current canonical name.

use ledgerline_core::error::DomainError;
use ledgerline_core::event::DomainEvent;
use ledgerline_core::repository::StoredEvent;
use ledgerline_core::type_registry::TypeRegistry;

/// Converts a typed event into a storable record.
///
/// # Errors
///
/// Returns `DomainError::UnresolvableType` if the event type is not
/// registered, or `DomainError::Infrastructure` if serialization fails.
pub fn encode_event<E: DomainEvent>(
    registry: &TypeRegistry,
    event: &E,
) -> Result<StoredEvent, DomainError> {
    let (stored_assembly_name, stored_type_name) = registry.bind_to_name(&event.event_type())?;
    let meta = event.metadata();
    Ok(StoredEvent {
        event_id: meta.event_id,
        tenant_id: meta.tenant_id,
        aggregate_id: meta.aggregate_id,
        sequence_number: meta.sequence_number,
        stored_assembly_name,
        stored_type_name,
        payload: event.to_payload()?,
        correlation_id: meta.correlation_id,
        causation_id: meta.causation_id,
        performing_user_id: meta.performing_user_id,
        occurred_at: meta.occurred_at,
    })
}

/// Rebuilds a typed event from a stored record.
///
/// # Errors
///
/// Returns `DomainError::UnresolvableType` if the stored type cannot be
/// bound, or whatever [`DomainEvent::from_payload`] reports.
pub fn decode_event<E: DomainEvent>(
    registry: &TypeRegistry,
    stored: &StoredEvent,
) -> Result<E, DomainError> {
    let binding =
        registry.bind_to_type(&stored.stored_assembly_name, &stored.stored_type_name)?;
    E::from_payload(&binding, stored.metadata(), stored.payload.clone())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ledgerline_core::aggregate::AggregateRoot;
    use ledgerline_core::error::DomainError;
    use ledgerline_core::ids::{AggregateId, TenantId};
    use ledgerline_core::type_registry::TypeRegistry;
    use ledgerline_test_support::{TALLY_ASSEMBLY, Tally, TallyEvent, TallyEventKind, tally_registry};

    use super::{decode_event, encode_event};

    fn increment_event() -> TallyEvent {
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let mut tally = Tally::new(TenantId::new(), AggregateId::new());
        tally.increment(3, now);
        tally.uncommitted_events()[0].clone()
    }

    #[test]
    fn test_encode_then_decode_restores_event() {
        // Arrange
        let registry = tally_registry().unwrap();
        let event = increment_event();

        // Act
        let stored = encode_event(&registry, &event).unwrap();
        let decoded: TallyEvent = decode_event(&registry, &stored).unwrap();

        // Assert
        assert_eq!(stored.stored_assembly_name, TALLY_ASSEMBLY);
        assert_eq!(stored.stored_type_name, "Incremented");
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_decode_historic_name_yields_current_variant() {
        // Arrange
        let registry = tally_registry().unwrap();
        let mut stored = encode_event(&registry, &increment_event()).unwrap();
        stored.stored_type_name = "Added".to_owned();

        // Act
        let decoded: TallyEvent = decode_event(&registry, &stored).unwrap();

        // Assert
        assert_eq!(decoded.kind, TallyEventKind::Incremented { amount: 3 });
    }

    #[test]
    fn test_encode_unregistered_type_fails_closed() {
        // Arrange
        let registry = TypeRegistry::new();

        // Act
        let result = encode_event(&registry, &increment_event());

        // Assert
        assert!(matches!(result, Err(DomainError::UnresolvableType { .. })));
    }

    #[test]
    fn test_decode_malformed_payload_is_infrastructure_error() {
        // Arrange
        let registry = tally_registry().unwrap();
        let mut stored = encode_event(&registry, &increment_event()).unwrap();
        stored.payload = serde_json::json!({ "amount": "three" });

        // Act
        let result: Result<TallyEvent, _> = decode_event(&registry, &stored);

        // Assert
        assert!(matches!(result, Err(DomainError::Infrastructure(_))));
    }
}
