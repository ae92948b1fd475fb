//! A minimal event-sourced aggregate used to exercise the engine.
//!
//! `Incremented` was originally written as `Added`; the registry returned by
//! [`tally_registry`] carries that rename.

use chrono::{DateTime, Utc};
use ledgerline_core::aggregate::{AggregateRoot, Snapshotting};
use ledgerline_core::error::DomainError;
use ledgerline_core::event::{DomainEvent, EventMetadata};
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::type_registry::{TypeDescriptor, TypeRegistry};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assembly name of every tally type.
pub const TALLY_ASSEMBLY: &str = "ledgerline.test";

/// Event payload variants for the tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TallyEventKind {
    /// The tally was opened.
    Opened {
        /// Display label.
        label: String,
    },
    /// The total grew.
    Incremented {
        /// Amount added.
        amount: i64,
    },
    /// The total was cleared.
    Reset,
}

impl TallyEventKind {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Opened { .. } => "Opened",
            Self::Incremented { .. } => "Incremented",
            Self::Reset => "Reset",
        }
    }
}

/// Tally event envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct TallyEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: TallyEventKind,
}

impl DomainEvent for TallyEvent {
    fn event_type(&self) -> TypeDescriptor {
        TypeDescriptor::new(TALLY_ASSEMBLY, self.kind.type_name())
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        let payload = match &self.kind {
            TallyEventKind::Opened { label } => serde_json::json!({ "label": label }),
            TallyEventKind::Incremented { amount } => serde_json::json!({ "amount": amount }),
            TallyEventKind::Reset => serde_json::json!({}),
        };
        Ok(payload)
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn from_payload(
        binding: &TypeDescriptor,
        metadata: EventMetadata,
        payload: serde_json::Value,
    ) -> Result<Self, DomainError> {
        let field = |name: &str| {
            payload.get(name).cloned().ok_or_else(|| {
                DomainError::Infrastructure(format!("tally payload missing field {name}"))
            })
        };
        let kind = if binding.is(TALLY_ASSEMBLY, "Opened") {
            TallyEventKind::Opened {
                label: serde_json::from_value(field("label")?)
                    .map_err(|e| DomainError::Infrastructure(e.to_string()))?,
            }
        } else if binding.is(TALLY_ASSEMBLY, "Incremented") {
            TallyEventKind::Incremented {
                amount: serde_json::from_value(field("amount")?)
                    .map_err(|e| DomainError::Infrastructure(e.to_string()))?,
            }
        } else if binding.is(TALLY_ASSEMBLY, "Reset") {
            TallyEventKind::Reset
        } else {
            return Err(DomainError::unresolvable(
                binding.assembly.clone(),
                binding.type_name(),
            ));
        };
        Ok(Self { metadata, kind })
    }
}

/// Registry with the tally types and their rename history.
///
/// # Errors
///
/// Returns `DomainError::InvalidOperation` if the rename collides with a current type.
pub fn tally_registry() -> Result<TypeRegistry, DomainError> {
    let mut registry = TypeRegistry::new();
    registry
        .register(TALLY_ASSEMBLY, "Opened")
        .register(TALLY_ASSEMBLY, "Incremented")
        .register(TALLY_ASSEMBLY, "Reset")
        .register(TALLY_ASSEMBLY, "TallyState");
    registry
        .register_rename((TALLY_ASSEMBLY, "Added"), (TALLY_ASSEMBLY, "Incremented"))?;
    Ok(registry)
}

/// Serializable tally state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyState {
    /// Display label.
    pub label: String,
    /// Running total.
    pub total: i64,
    /// Number of increments applied since the last reset.
    pub increments: u32,
}

/// A counter aggregate.
#[derive(Debug)]
pub struct Tally {
    tenant_id: TenantId,
    id: AggregateId,
    version: i64,
    /// Current state.
    pub state: TallyState,
    uncommitted_events: Vec<TallyEvent>,
}

impl Tally {
    /// Opens the tally.
    pub fn open(&mut self, label: &str, now: DateTime<Utc>) {
        self.raise(
            TallyEventKind::Opened {
                label: label.to_owned(),
            },
            now,
        );
    }

    /// Adds `amount` to the total.
    pub fn increment(&mut self, amount: i64, now: DateTime<Utc>) {
        self.raise(TallyEventKind::Incremented { amount }, now);
    }

    /// Clears the total.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.raise(TallyEventKind::Reset, now);
    }

    fn raise(&mut self, kind: TallyEventKind, now: DateTime<Utc>) {
        let correlation_id = Uuid::new_v4();
        let event = TallyEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                tenant_id: self.tenant_id,
                aggregate_id: self.id,
                sequence_number: self.version + 1,
                correlation_id,
                causation_id: correlation_id,
                performing_user_id: None,
                occurred_at: now,
            },
            kind,
        };
        self.apply(&event);
        self.uncommitted_events.push(event);
    }
}

impl AggregateRoot for Tally {
    type Event = TallyEvent;

    const ENTITY_TYPE: &'static str = "tally";

    fn new(tenant_id: TenantId, aggregate_id: AggregateId) -> Self {
        Self {
            tenant_id,
            id: aggregate_id,
            version: 0,
            state: TallyState::default(),
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
        match &event.kind {
            TallyEventKind::Opened { label } => self.state.label.clone_from(label),
            TallyEventKind::Incremented { amount } => {
                self.state.total += amount;
                self.state.increments += 1;
            }
            TallyEventKind::Reset => {
                self.state.total = 0;
                self.state.increments = 0;
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

impl Snapshotting for Tally {
    fn state_type() -> TypeDescriptor {
        TypeDescriptor::new(TALLY_ASSEMBLY, "TallyState")
    }

    fn snapshot_state(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(&self.state).map_err(|e| DomainError::Infrastructure(e.to_string()))
    }

    fn from_snapshot(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        version: i64,
        state: serde_json::Value,
    ) -> Result<Self, DomainError> {
        let state: TallyState =
            serde_json::from_value(state).map_err(|e| DomainError::Infrastructure(e.to_string()))?;
        Ok(Self {
            tenant_id,
            id: aggregate_id,
            version,
            state,
            uncommitted_events: Vec::new(),
        })
    }
}
