//! Domain events for the quote context.
//!
//! Quotes were first written by the legacy `Insurance.Quoting` assembly. The
//! registry built by [`quote_registry`] maps every legacy name onto its
//! current type, so old streams stay loadable while new events are written
//! under `ledgerline.quote` names.

use ledgerline_core::error::DomainError;
use ledgerline_core::event::{DomainEvent, EventMetadata};
use ledgerline_core::type_registry::{TypeDescriptor, TypeRegistry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Assembly name of every current quote type.
pub const QUOTE_ASSEMBLY: &str = "ledgerline.quote";

/// Assembly name quote events were originally written under.
pub const LEGACY_QUOTE_ASSEMBLY: &str = "Insurance.Quoting";

/// Type name of the serialized quote state.
pub const QUOTE_STATE_TYPE: &str = "QuoteState";

/// Emitted when a quote is opened for a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteOpened {
    /// Customer the quote is for.
    pub customer_name: String,
    /// Product being quoted.
    pub product_code: String,
}

/// Emitted when a coverage is added to the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageAdded {
    /// Coverage code.
    pub coverage_code: String,
    /// Coverage limit in cents.
    pub limit_cents: i64,
}

/// Emitted when the premium is (re)calculated. Formerly `PremiumQuoted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumCalculated {
    /// Annual premium in cents.
    pub premium_cents: i64,
}

/// Emitted when the quote is bound into a policy. Formerly `QuoteIssued`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteBound {
    /// Policy number issued on binding.
    pub policy_number: String,
}

/// Event payload variants for the quote context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteEventKind {
    /// A quote was opened.
    QuoteOpened(QuoteOpened),
    /// A coverage was added.
    CoverageAdded(CoverageAdded),
    /// The premium was calculated.
    PremiumCalculated(PremiumCalculated),
    /// The quote was bound.
    QuoteBound(QuoteBound),
}

impl QuoteEventKind {
    /// Current type name of this variant.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::QuoteOpened(_) => "QuoteOpened",
            Self::CoverageAdded(_) => "CoverageAdded",
            Self::PremiumCalculated(_) => "PremiumCalculated",
            Self::QuoteBound(_) => "QuoteBound",
        }
    }
}

/// Domain event envelope for the quote context.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteEvent {
    /// Event metadata.
    pub metadata: EventMetadata,
    /// Event-specific payload.
    pub kind: QuoteEventKind,
}

fn to_value<T: Serialize>(payload: &T) -> Result<serde_json::Value, DomainError> {
    serde_json::to_value(payload)
        .map_err(|e| DomainError::Infrastructure(format!("event serialization failed: {e}")))
}

fn from_value<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, DomainError> {
    serde_json::from_value(payload)
        .map_err(|e| DomainError::Infrastructure(format!("event deserialization failed: {e}")))
}

impl DomainEvent for QuoteEvent {
    fn event_type(&self) -> TypeDescriptor {
        TypeDescriptor::new(QUOTE_ASSEMBLY, self.kind.type_name())
    }

    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        match &self.kind {
            QuoteEventKind::QuoteOpened(e) => to_value(e),
            QuoteEventKind::CoverageAdded(e) => to_value(e),
            QuoteEventKind::PremiumCalculated(e) => to_value(e),
            QuoteEventKind::QuoteBound(e) => to_value(e),
        }
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn from_payload(
        binding: &TypeDescriptor,
        metadata: EventMetadata,
        payload: serde_json::Value,
    ) -> Result<Self, DomainError> {
        if binding.assembly != QUOTE_ASSEMBLY || !binding.arguments.is_empty() {
            return Err(DomainError::unresolvable(
                binding.assembly.clone(),
                binding.type_name(),
            ));
        }
        let kind = match binding.name.as_str() {
            "QuoteOpened" => QuoteEventKind::QuoteOpened(from_value(payload)?),
            "CoverageAdded" => QuoteEventKind::CoverageAdded(from_value(payload)?),
            "PremiumCalculated" => QuoteEventKind::PremiumCalculated(from_value(payload)?),
            "QuoteBound" => QuoteEventKind::QuoteBound(from_value(payload)?),
            other => return Err(DomainError::unresolvable(QUOTE_ASSEMBLY, other)),
        };
        Ok(Self { metadata, kind })
    }
}

/// Builds the registry of quote types and their legacy names.
///
/// # Errors
///
/// Returns `DomainError::InvalidOperation` if the rename table is
/// inconsistent.
pub fn quote_registry() -> Result<TypeRegistry, DomainError> {
    let mut registry = TypeRegistry::new();
    registry
        .register(QUOTE_ASSEMBLY, "QuoteOpened")
        .register(QUOTE_ASSEMBLY, "CoverageAdded")
        .register(QUOTE_ASSEMBLY, "PremiumCalculated")
        .register(QUOTE_ASSEMBLY, "QuoteBound")
        .register(QUOTE_ASSEMBLY, QUOTE_STATE_TYPE);
    registry
        .register_rename(
            (LEGACY_QUOTE_ASSEMBLY, "QuoteCreated"),
            (QUOTE_ASSEMBLY, "QuoteOpened"),
        )?
        .register_rename(
            (LEGACY_QUOTE_ASSEMBLY, "CoverageAdded"),
            (QUOTE_ASSEMBLY, "CoverageAdded"),
        )?
        .register_rename(
            (LEGACY_QUOTE_ASSEMBLY, "PremiumQuoted"),
            (QUOTE_ASSEMBLY, "PremiumCalculated"),
        )?
        .register_rename(
            (LEGACY_QUOTE_ASSEMBLY, "QuoteIssued"),
            (QUOTE_ASSEMBLY, "QuoteBound"),
        )?
        .register_rename(
            (LEGACY_QUOTE_ASSEMBLY, QUOTE_STATE_TYPE),
            (QUOTE_ASSEMBLY, QUOTE_STATE_TYPE),
        )?;
    Ok(registry)
}
