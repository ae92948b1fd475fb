//! Query handlers for the quote context.
//!
//! Queries run with read-only intent, so a request scope that starts with a
//! query can no longer be used to write.

use ledgerline_core::aggregate::AggregateRoot;
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::AggregateId;
use ledgerline_core::intent::RequestScope;
use ledgerline_engine::guard::intercept;
use ledgerline_engine::repository::AggregateRepository;
use serde::Serialize;

use crate::application::projections::{QuoteSummary, QuoteSummaryProjection};
use crate::domain::aggregates::{Quote, QuoteState};
use crate::domain::commands::GetQuote;

/// Read-only view of a quote aggregate.
#[derive(Debug, Serialize)]
pub struct QuoteView {
    /// The quote identifier.
    pub quote_id: AggregateId,
    /// Current state.
    pub state: QuoteState,
    /// Current version (event count).
    pub version: i64,
}

/// Loads a quote from the event store.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the quote has no events, or
/// any storage or decoding error.
pub async fn get_quote_by_id(
    scope: &RequestScope,
    query: &GetQuote,
    repo: &AggregateRepository<Quote>,
) -> Result<QuoteView, DomainError> {
    intercept(scope, query, move || async move {
        let quote = repo.get_by_id(query.tenant_id, query.quote_id).await?;
        Ok(QuoteView {
            quote_id: query.quote_id,
            state: quote.state().clone(),
            version: quote.version(),
        })
    })
    .await
}

/// Reads a quote summary from the read model.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the read model has no row for
/// the quote.
pub async fn get_quote_summary(
    scope: &RequestScope,
    query: &GetQuote,
    projection: &QuoteSummaryProjection,
) -> Result<QuoteSummary, DomainError> {
    intercept(scope, query, move || async move {
        projection
            .get(query.tenant_id, query.quote_id)?
            .ok_or(DomainError::AggregateNotFound(query.quote_id))
    })
    .await
}
