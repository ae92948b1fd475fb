//! Aggregate root for the quote context.

use ledgerline_core::aggregate::{AggregateRoot, Snapshotting};
use ledgerline_core::clock::Clock;
use ledgerline_core::error::DomainError;
use ledgerline_core::event::EventMetadata;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::type_registry::TypeDescriptor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{
    CoverageAdded, PremiumCalculated, QUOTE_ASSEMBLY, QUOTE_STATE_TYPE, QuoteBound, QuoteEvent,
    QuoteEventKind, QuoteOpened,
};

/// Lifecycle of a quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    /// Not opened yet.
    #[default]
    New,
    /// Opened and collecting coverages.
    Draft,
    /// A premium has been calculated for the current coverages.
    Priced,
    /// Bound into a policy. No further changes are accepted.
    Bound,
}

/// One coverage line on a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coverage {
    /// Coverage code.
    pub code: String,
    /// Coverage limit in cents.
    pub limit_cents: i64,
}

/// Serializable quote state, used for snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteState {
    /// Lifecycle status.
    pub status: QuoteStatus,
    /// Customer the quote is for.
    pub customer_name: String,
    /// Product being quoted.
    pub product_code: String,
    /// Coverage lines in the order they were added.
    pub coverages: Vec<Coverage>,
    /// Latest calculated premium in cents.
    pub premium_cents: Option<i64>,
    /// Policy number once bound.
    pub policy_number: Option<String>,
}

/// The aggregate root for an insurance quote.
#[derive(Debug)]
pub struct Quote {
    tenant_id: TenantId,
    id: AggregateId,
    version: i64,
    pub(crate) state: QuoteState,
    uncommitted_events: Vec<QuoteEvent>,
}

impl Quote {
    /// Current state.
    #[must_use]
    pub fn state(&self) -> &QuoteState {
        &self.state
    }

    /// Opens the quote.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if the quote is already open,
    /// or `DomainError::Validation` if the customer name is blank.
    pub fn open(
        &mut self,
        customer_name: &str,
        product_code: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.state.status != QuoteStatus::New {
            return Err(DomainError::InvalidOperation(format!(
                "quote {} is already open",
                self.id
            )));
        }
        if customer_name.trim().is_empty() {
            return Err(DomainError::Validation("customer name is required".to_owned()));
        }
        self.raise(
            QuoteEventKind::QuoteOpened(QuoteOpened {
                customer_name: customer_name.to_owned(),
                product_code: product_code.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Adds a coverage line. Any previously calculated premium is invalidated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` unless the quote is open and
    /// unbound, or `DomainError::Validation` for a non-positive limit.
    pub fn add_coverage(
        &mut self,
        coverage_code: &str,
        limit_cents: i64,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_modifiable()?;
        if limit_cents <= 0 {
            return Err(DomainError::Validation(format!(
                "coverage limit must be positive, got {limit_cents}"
            )));
        }
        self.raise(
            QuoteEventKind::CoverageAdded(CoverageAdded {
                coverage_code: coverage_code.to_owned(),
                limit_cents,
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Records a calculated premium.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` unless the quote is open,
    /// unbound and has at least one coverage.
    pub fn calculate_premium(
        &mut self,
        premium_cents: i64,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_modifiable()?;
        if self.state.coverages.is_empty() {
            return Err(DomainError::InvalidOperation(
                "cannot price a quote without coverages".to_owned(),
            ));
        }
        self.raise(
            QuoteEventKind::PremiumCalculated(PremiumCalculated { premium_cents }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    /// Binds the quote into a policy.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` unless the quote is priced.
    pub fn bind(
        &mut self,
        policy_number: &str,
        correlation_id: Uuid,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if self.state.status != QuoteStatus::Priced {
            return Err(DomainError::InvalidOperation(format!(
                "quote {} must be priced before binding",
                self.id
            )));
        }
        self.raise(
            QuoteEventKind::QuoteBound(QuoteBound {
                policy_number: policy_number.to_owned(),
            }),
            correlation_id,
            clock,
        );
        Ok(())
    }

    fn ensure_modifiable(&self) -> Result<(), DomainError> {
        match self.state.status {
            QuoteStatus::Draft | QuoteStatus::Priced => Ok(()),
            QuoteStatus::New => Err(DomainError::InvalidOperation(format!(
                "quote {} is not open",
                self.id
            ))),
            QuoteStatus::Bound => Err(DomainError::InvalidOperation(format!(
                "quote {} is bound",
                self.id
            ))),
        }
    }

    fn raise(&mut self, kind: QuoteEventKind, correlation_id: Uuid, clock: &dyn Clock) {
        let event = QuoteEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                tenant_id: self.tenant_id,
                aggregate_id: self.id,
                sequence_number: self.version + 1,
                correlation_id,
                causation_id: correlation_id,
                performing_user_id: None,
                occurred_at: clock.now(),
            },
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for Quote {
    type Event = QuoteEvent;

    const ENTITY_TYPE: &'static str = "quote";

    fn new(tenant_id: TenantId, aggregate_id: AggregateId) -> Self {
        Self {
            tenant_id,
            id: aggregate_id,
            version: 0,
            state: QuoteState::default(),
            uncommitted_events: Vec::new(),
        }
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn aggregate_id(&self) -> AggregateId {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &Self::Event) {
        let state = &mut self.state;
        match &event.kind {
            QuoteEventKind::QuoteOpened(e) => {
                state.status = QuoteStatus::Draft;
                state.customer_name.clone_from(&e.customer_name);
                state.product_code.clone_from(&e.product_code);
            }
            QuoteEventKind::CoverageAdded(e) => {
                state.status = QuoteStatus::Draft;
                state.premium_cents = None;
                state.coverages.push(Coverage {
                    code: e.coverage_code.clone(),
                    limit_cents: e.limit_cents,
                });
            }
            QuoteEventKind::PremiumCalculated(e) => {
                state.status = QuoteStatus::Priced;
                state.premium_cents = Some(e.premium_cents);
            }
            QuoteEventKind::QuoteBound(e) => {
                state.status = QuoteStatus::Bound;
                state.policy_number = Some(e.policy_number.clone());
            }
        }
        self.version += 1;
    }

    fn uncommitted_events(&self) -> &[Self::Event] {
        &self.uncommitted_events
    }

    fn mark_committed(&mut self) {
        self.uncommitted_events.clear();
    }
}

impl Snapshotting for Quote {
    fn state_type() -> TypeDescriptor {
        TypeDescriptor::new(QUOTE_ASSEMBLY, QUOTE_STATE_TYPE)
    }

    fn snapshot_state(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(&self.state)
            .map_err(|e| DomainError::Infrastructure(format!("snapshot serialization failed: {e}")))
    }

    fn from_snapshot(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        version: i64,
        state: serde_json::Value,
    ) -> Result<Self, DomainError> {
        let state = serde_json::from_value(state).map_err(|e| {
            DomainError::Infrastructure(format!("snapshot deserialization failed: {e}"))
        })?;
        Ok(Self {
            tenant_id,
            id: aggregate_id,
            version,
            state,
            uncommitted_events: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use ledgerline_core::aggregate::{AggregateRoot, Snapshotting};
    use ledgerline_core::error::DomainError;
    use ledgerline_core::ids::{AggregateId, TenantId};
    use ledgerline_test_support::FixedClock;
    use uuid::Uuid;

    use super::{Quote, QuoteStatus};
    use crate::domain::events::QuoteEventKind;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn open_quote() -> Quote {
        let mut quote = Quote::new(TenantId::new(), AggregateId::new());
        quote
            .open("Ada Lovelace", "home", Uuid::new_v4(), &clock())
            .unwrap();
        quote
    }

    #[test]
    fn test_open_buffers_event_and_advances_version() {
        // Arrange
        let correlation_id = Uuid::new_v4();
        let mut quote = Quote::new(TenantId::new(), AggregateId::new());

        // Act
        quote
            .open("Ada Lovelace", "home", correlation_id, &clock())
            .unwrap();

        // Assert
        assert_eq!(quote.version(), 1);
        assert_eq!(quote.state().status, QuoteStatus::Draft);
        let events = quote.uncommitted_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metadata.sequence_number, 1);
        assert_eq!(events[0].metadata.correlation_id, correlation_id);
        assert_eq!(events[0].metadata.occurred_at, clock().0);
        assert!(matches!(events[0].kind, QuoteEventKind::QuoteOpened(_)));
    }

    #[test]
    fn test_open_twice_is_rejected() {
        // Arrange
        let mut quote = open_quote();

        // Act
        let result = quote.open("Ada Lovelace", "home", Uuid::new_v4(), &clock());

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
        assert_eq!(quote.uncommitted_events().len(), 1);
    }

    #[test]
    fn test_adding_coverage_clears_previous_premium() {
        // Arrange
        let mut quote = open_quote();
        quote
            .add_coverage("fire", 100_000, Uuid::new_v4(), &clock())
            .unwrap();
        quote.calculate_premium(1_200, Uuid::new_v4(), &clock()).unwrap();

        // Act
        quote
            .add_coverage("flood", 50_000, Uuid::new_v4(), &clock())
            .unwrap();

        // Assert
        assert_eq!(quote.state().status, QuoteStatus::Draft);
        assert_eq!(quote.state().premium_cents, None);
        assert_eq!(quote.state().coverages.len(), 2);
        assert_eq!(quote.version(), 4);
    }

    #[test]
    fn test_bind_requires_premium() {
        // Arrange
        let mut quote = open_quote();
        quote
            .add_coverage("fire", 100_000, Uuid::new_v4(), &clock())
            .unwrap();

        // Act
        let result = quote.bind("POL-1", Uuid::new_v4(), &clock());

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
    }

    #[test]
    fn test_bound_quote_rejects_changes() {
        // Arrange
        let mut quote = open_quote();
        quote
            .add_coverage("fire", 100_000, Uuid::new_v4(), &clock())
            .unwrap();
        quote.calculate_premium(1_200, Uuid::new_v4(), &clock()).unwrap();
        quote.bind("POL-1", Uuid::new_v4(), &clock()).unwrap();

        // Act
        let result = quote.add_coverage("theft", 10_000, Uuid::new_v4(), &clock());

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
        assert_eq!(quote.state().policy_number.as_deref(), Some("POL-1"));
    }

    #[test]
    fn test_non_positive_limit_is_rejected() {
        // Arrange
        let mut quote = open_quote();

        // Act
        let result = quote.add_coverage("fire", 0, Uuid::new_v4(), &clock());

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_snapshot_state_restores_equal_quote() {
        // Arrange
        let mut quote = open_quote();
        quote
            .add_coverage("fire", 100_000, Uuid::new_v4(), &clock())
            .unwrap();
        quote.mark_committed();

        // Act
        let state = quote.snapshot_state().unwrap();
        let restored =
            Quote::from_snapshot(quote.tenant_id(), quote.aggregate_id(), quote.version(), state)
                .unwrap();

        // Assert
        assert_eq!(restored.state(), quote.state());
        assert_eq!(restored.version(), 2);
        assert!(restored.uncommitted_events().is_empty());
    }
}
