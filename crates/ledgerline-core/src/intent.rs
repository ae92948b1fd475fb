//! Request intent and the request-scoped read/write guard.
//!
//! A [`RequestScope`] is created per inbound request and tagged by the first
//! operation dispatched inside it. A scope tagged `ReadOnly` (for example one
//! bound to a read replica) rejects any later `ReadWrite` operation before it
//! reaches the event store.

use std::fmt;
use std::sync::OnceLock;

use uuid::Uuid;

use crate::error::DomainError;

/// Declared intent of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestIntent {
    /// The operation only reads state.
    ReadOnly,
    /// The operation may append events.
    ReadWrite,
}

impl fmt::Display for RequestIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => f.write_str("read-only"),
            Self::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// Request-scoped context carrying the resolved intent.
#[derive(Debug)]
pub struct RequestScope {
    request_id: Uuid,
    intent: OnceLock<RequestIntent>,
}

impl RequestScope {
    /// Creates an untagged scope.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            intent: OnceLock::new(),
        }
    }

    /// Creates a scope already tagged with `intent`.
    #[must_use]
    pub fn tagged(intent: RequestIntent) -> Self {
        let scope = Self::new();
        let _ = scope.intent.set(intent);
        scope
    }

    /// Identifier of the request this scope belongs to.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The scope's intent, or `None` before the first operation.
    #[must_use]
    pub fn intent(&self) -> Option<RequestIntent> {
        self.intent.get().copied()
    }

    /// Admits an operation declaring `intent`, tagging the scope if this is
    /// the first operation dispatched within it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if the scope is `ReadOnly` and
    /// `intent` is `ReadWrite`.
    pub fn enter(&self, intent: RequestIntent) -> Result<RequestIntent, DomainError> {
        let scope_intent = *self.intent.get_or_init(|| intent);
        if scope_intent == RequestIntent::ReadOnly && intent == RequestIntent::ReadWrite {
            return Err(DomainError::InvalidOperation(format!(
                "request {} is read-only; read-write operation rejected",
                self.request_id
            )));
        }
        Ok(scope_intent)
    }

    /// Shorthand for `enter(RequestIntent::ReadWrite)`, used by write paths.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if the scope is `ReadOnly`.
    pub fn ensure_writable(&self) -> Result<(), DomainError> {
        self.enter(RequestIntent::ReadWrite).map(|_| ())
    }
}

impl Default for RequestScope {
    fn default() -> Self {
        Self::new()
    }
}
