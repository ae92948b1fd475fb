//! Domain error types.

use thiserror::Error;

use crate::ids::AggregateId;
use crate::observer::DispatchReport;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No snapshot and no events exist for the aggregate.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(AggregateId),

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: AggregateId,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// The type registry has no binding for a stored type identity.
    #[error("unresolvable type {assembly}:{type_name}")]
    UnresolvableType {
        /// Stored assembly name.
        assembly: String,
        /// Stored type name, including any generic arguments.
        type_name: String,
    },

    /// One or more observers failed while events were being dispatched.
    #[error("dispatch failed for {} observer invocation(s)", .0.failures.len())]
    DispatchFailure(DispatchReport),

    /// A read/write intent violation or a similar misuse of the API.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Builds an `UnresolvableType` error from a stored identity.
    pub fn unresolvable(assembly: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::UnresolvableType {
            assembly: assembly.into(),
            type_name: type_name.into(),
        }
    }

    /// Returns `true` for errors a caller may resolve by reloading and retrying.
    #[must_use]
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}
