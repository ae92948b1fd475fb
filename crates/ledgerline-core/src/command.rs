//! Command abstractions.

use uuid::Uuid;

use crate::intent::RequestIntent;

/// Trait that all commands and queries dispatched through the pipeline implement.
pub trait Command: Send + Sync + std::fmt::Debug {
    /// The type name for this command (for logging/routing).
    fn command_type(&self) -> &'static str;

    /// Correlation ID to trace this command through the system.
    fn correlation_id(&self) -> Uuid;

    /// Whether the command only reads or may also append events.
    fn intent(&self) -> RequestIntent;
}
