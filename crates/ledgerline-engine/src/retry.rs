//! Bounded reload-and-retry for command handlers.
//!
//! The store never retries a conflicting append itself. Command handlers wrap
//! their load/mutate/save sequence in [`execute_with_retry`] so a conflict
//! reloads the aggregate and tries again, up to a fixed number of times.

use std::future::Future;

use ledgerline_core::error::DomainError;
use tracing::warn;

/// Runs `operation`, re-running it after each `ConcurrencyConflict` until it
/// succeeds or `max_retries` extra attempts have been made.
///
/// The closure receives the zero-based attempt number. Each attempt must
/// reload the aggregate; reusing a stale instance would conflict again.
///
/// # Errors
///
/// Returns the last `ConcurrencyConflict` once retries are exhausted, or any
/// other error immediately.
pub async fn execute_with_retry<T, F, Fut>(
    max_retries: u32,
    mut operation: F,
) -> Result<T, DomainError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Err(err) if err.is_concurrency_conflict() && attempt < max_retries => {
                attempt += 1;
                warn!(attempt, max_retries, error = %err, "retrying after concurrency conflict");
            }
            result => return result,
        }
    }
}
