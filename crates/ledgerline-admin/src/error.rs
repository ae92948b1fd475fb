//! Admin tool error types.

use ledgerline_core::error::DomainError;
use thiserror::Error;

/// Errors surfaced by the admin tool.
#[derive(Debug, Error)]
pub enum AdminError {
    /// A required setting is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The engine rejected or failed the operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The report could not be rendered.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),
}
