//! Read models and outbound emitters fed by quote events.
//!
//! Both handlers tolerate redelivery: the summary projection ignores events at
//! or below the last sequence number it applied for a quote, and the outbox
//! records each event id at most once.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::observer::EventHandler;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::domain::aggregates::QuoteStatus;
use crate::domain::events::{QuoteEvent, QuoteEventKind};

/// Queryable summary of one quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteSummary {
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// The quote.
    pub quote_id: AggregateId,
    /// Customer the quote is for.
    pub customer_name: String,
    /// Product being quoted.
    pub product_code: String,
    /// Lifecycle status.
    pub status: QuoteStatus,
    /// Number of coverage lines.
    pub coverage_count: usize,
    /// Sum of all coverage limits in cents.
    pub total_limit_cents: i64,
    /// Latest premium in cents.
    pub premium_cents: Option<i64>,
    /// Policy number once bound.
    pub policy_number: Option<String>,
    /// Sequence number of the last event applied.
    pub last_sequence_number: i64,
}

impl QuoteSummary {
    fn empty(tenant_id: TenantId, quote_id: AggregateId) -> Self {
        Self {
            tenant_id,
            quote_id,
            customer_name: String::new(),
            product_code: String::new(),
            status: QuoteStatus::New,
            coverage_count: 0,
            total_limit_cents: 0,
            premium_cents: None,
            policy_number: None,
            last_sequence_number: 0,
        }
    }

    fn apply(&mut self, kind: &QuoteEventKind) {
        match kind {
            QuoteEventKind::QuoteOpened(e) => {
                self.status = QuoteStatus::Draft;
                self.customer_name.clone_from(&e.customer_name);
                self.product_code.clone_from(&e.product_code);
            }
            QuoteEventKind::CoverageAdded(e) => {
                self.status = QuoteStatus::Draft;
                self.coverage_count += 1;
                self.total_limit_cents += e.limit_cents;
                self.premium_cents = None;
            }
            QuoteEventKind::PremiumCalculated(e) => {
                self.status = QuoteStatus::Priced;
                self.premium_cents = Some(e.premium_cents);
            }
            QuoteEventKind::QuoteBound(e) => {
                self.status = QuoteStatus::Bound;
                self.policy_number = Some(e.policy_number.clone());
            }
        }
    }
}

type SummaryKey = (TenantId, AggregateId);

fn poisoned() -> DomainError {
    DomainError::Infrastructure("quote read model lock poisoned".to_owned())
}

/// In-memory quote summary read model.
#[derive(Debug, Default)]
pub struct QuoteSummaryProjection {
    rows: Mutex<HashMap<SummaryKey, QuoteSummary>>,
}

impl QuoteSummaryProjection {
    /// Creates an empty projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the summary of one quote.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn get(
        &self,
        tenant_id: TenantId,
        quote_id: AggregateId,
    ) -> Result<Option<QuoteSummary>, DomainError> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        Ok(rows.get(&(tenant_id, quote_id)).cloned())
    }

    /// Returns every summary for a tenant, ordered by quote id.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn list(&self, tenant_id: TenantId) -> Result<Vec<QuoteSummary>, DomainError> {
        let rows = self.rows.lock().map_err(|_| poisoned())?;
        let mut summaries: Vec<QuoteSummary> = rows
            .values()
            .filter(|summary| summary.tenant_id == tenant_id)
            .cloned()
            .collect();
        summaries.sort_by_key(|summary| summary.quote_id);
        Ok(summaries)
    }

    /// Drops every row, ahead of a full rebuild.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn reset(&self) -> Result<(), DomainError> {
        self.rows.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

#[async_trait]
impl EventHandler<QuoteEvent> for QuoteSummaryProjection {
    fn name(&self) -> &str {
        "quote_summary"
    }

    async fn handle(
        &self,
        event: &QuoteEvent,
        aggregate_id: AggregateId,
        tenant_id: TenantId,
    ) -> Result<(), DomainError> {
        let sequence_number = event.metadata.sequence_number;
        let mut rows = self.rows.lock().map_err(|_| poisoned())?;
        let row = rows
            .entry((tenant_id, aggregate_id))
            .or_insert_with(|| QuoteSummary::empty(tenant_id, aggregate_id));
        if sequence_number <= row.last_sequence_number {
            debug!(%aggregate_id, sequence_number, "quote summary already up to date");
            return Ok(());
        }
        row.apply(&event.kind);
        row.last_sequence_number = sequence_number;
        Ok(())
    }
}

/// Notification queued when a quote is bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyIssuedNotification {
    /// Event that caused the notification.
    pub event_id: Uuid,
    /// Tenant the policy belongs to.
    pub tenant_id: TenantId,
    /// The bound quote.
    pub quote_id: AggregateId,
    /// Issued policy number.
    pub policy_number: String,
    /// When the quote was bound.
    pub bound_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct OutboxState {
    seen: HashSet<Uuid>,
    pending: Vec<PolicyIssuedNotification>,
}

/// System-event emitter queueing policy-issued notifications.
#[derive(Debug, Default)]
pub struct PolicyIssuedOutbox {
    state: Mutex<OutboxState>,
}

impl PolicyIssuedOutbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every pending notification, leaving the outbox empty.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the lock is poisoned.
    pub fn drain(&self) -> Result<Vec<PolicyIssuedNotification>, DomainError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        Ok(std::mem::take(&mut state.pending))
    }
}

#[async_trait]
impl EventHandler<QuoteEvent> for PolicyIssuedOutbox {
    fn name(&self) -> &str {
        "policy_issued_outbox"
    }

    async fn handle(
        &self,
        event: &QuoteEvent,
        aggregate_id: AggregateId,
        tenant_id: TenantId,
    ) -> Result<(), DomainError> {
        let QuoteEventKind::QuoteBound(bound) = &event.kind else {
            return Ok(());
        };
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        if !state.seen.insert(event.metadata.event_id) {
            return Ok(());
        }
        state.pending.push(PolicyIssuedNotification {
            event_id: event.metadata.event_id,
            tenant_id,
            quote_id: aggregate_id,
            policy_number: bound.policy_number.clone(),
            bound_at: event.metadata.occurred_at,
        });
        Ok(())
    }
}
