//! Command handlers for the quote context.
//!
//! Each handler passes the request scope guard, then loads the quote, runs
//! the domain operation and saves the result. Changes to an existing quote
//! are retried on concurrency conflicts up to the configured limit.

use ledgerline_core::aggregate::AggregateRoot;
use ledgerline_core::clock::Clock;
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::intent::RequestScope;
use ledgerline_engine::guard::intercept;
use ledgerline_engine::repository::{AggregateRepository, SaveOutcome};
use ledgerline_engine::retry::execute_with_retry;
use tracing::info;

use crate::domain::aggregates::Quote;
use crate::domain::commands::{AddCoverage, BindQuote, CalculatePremium, OpenQuote};

async fn update_quote<F>(
    repo: &AggregateRepository<Quote>,
    tenant_id: TenantId,
    quote_id: AggregateId,
    change: F,
) -> Result<SaveOutcome, DomainError>
where
    F: Fn(&mut Quote) -> Result<(), DomainError>,
{
    let change = &change;
    let outcome = execute_with_retry(repo.config().max_concurrency_retries, move |_| async move {
        let mut quote = repo.get_by_id(tenant_id, quote_id).await?;
        change(&mut quote)?;
        repo.save(&mut quote).await
    })
    .await?;
    info!(%tenant_id, %quote_id, version = outcome.new_version, "quote updated");
    Ok(outcome)
}

/// Handles the `OpenQuote` command.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` if a quote with the same id
/// already exists, or any validation or storage error.
pub async fn handle_open_quote(
    scope: &RequestScope,
    command: &OpenQuote,
    clock: &dyn Clock,
    repo: &AggregateRepository<Quote>,
) -> Result<SaveOutcome, DomainError> {
    intercept(scope, command, move || async move {
        let mut quote = Quote::new(command.tenant_id, command.quote_id);
        quote.open(
            &command.customer_name,
            &command.product_code,
            command.correlation_id,
            clock,
        )?;
        let outcome = repo.save(&mut quote).await?;
        info!(tenant_id = %command.tenant_id, quote_id = %command.quote_id, "quote opened");
        Ok(outcome)
    })
    .await
}

/// Handles the `AddCoverage` command.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown quote, a domain
/// rule violation, or the last concurrency conflict once retries run out.
pub async fn handle_add_coverage(
    scope: &RequestScope,
    command: &AddCoverage,
    clock: &dyn Clock,
    repo: &AggregateRepository<Quote>,
) -> Result<SaveOutcome, DomainError> {
    intercept(scope, command, move || {
        update_quote(repo, command.tenant_id, command.quote_id, move |quote| {
            quote.add_coverage(
                &command.coverage_code,
                command.limit_cents,
                command.correlation_id,
                clock,
            )
        })
    })
    .await
}

/// Handles the `CalculatePremium` command.
///
/// # Errors
///
/// Same as [`handle_add_coverage`].
pub async fn handle_calculate_premium(
    scope: &RequestScope,
    command: &CalculatePremium,
    clock: &dyn Clock,
    repo: &AggregateRepository<Quote>,
) -> Result<SaveOutcome, DomainError> {
    intercept(scope, command, move || {
        update_quote(repo, command.tenant_id, command.quote_id, move |quote| {
            quote.calculate_premium(command.premium_cents, command.correlation_id, clock)
        })
    })
    .await
}

/// Handles the `BindQuote` command.
///
/// # Errors
///
/// Same as [`handle_add_coverage`].
pub async fn handle_bind_quote(
    scope: &RequestScope,
    command: &BindQuote,
    clock: &dyn Clock,
    repo: &AggregateRepository<Quote>,
) -> Result<SaveOutcome, DomainError> {
    intercept(scope, command, move || {
        update_quote(repo, command.tenant_id, command.quote_id, move |quote| {
            quote.bind(&command.policy_number, command.correlation_id, clock)
        })
    })
    .await
}
