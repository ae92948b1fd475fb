//! Commands and queries for the quote context.

use ledgerline_core::command::Command;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::intent::RequestIntent;
use uuid::Uuid;

/// Command to open a new quote.
#[derive(Debug, Clone)]
pub struct OpenQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// Identifier for the new quote.
    pub quote_id: AggregateId,
    /// Customer the quote is for.
    pub customer_name: String,
    /// Product being quoted.
    pub product_code: String,
}

/// Command to add a coverage line.
#[derive(Debug, Clone)]
pub struct AddCoverage {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// The quote to change.
    pub quote_id: AggregateId,
    /// Coverage code.
    pub coverage_code: String,
    /// Coverage limit in cents.
    pub limit_cents: i64,
}

/// Command to record a calculated premium.
#[derive(Debug, Clone)]
pub struct CalculatePremium {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// The quote to price.
    pub quote_id: AggregateId,
    /// Annual premium in cents.
    pub premium_cents: i64,
}

/// Command to bind a priced quote.
#[derive(Debug, Clone)]
pub struct BindQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// The quote to bind.
    pub quote_id: AggregateId,
    /// Policy number to issue.
    pub policy_number: String,
}

/// Query for the current state of one quote.
#[derive(Debug, Clone)]
pub struct GetQuote {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant the quote belongs to.
    pub tenant_id: TenantId,
    /// The quote to read.
    pub quote_id: AggregateId,
}

macro_rules! impl_command {
    ($ty:ty, $name:literal, $intent:expr) => {
        impl Command for $ty {
            fn command_type(&self) -> &'static str {
                $name
            }

            fn correlation_id(&self) -> Uuid {
                self.correlation_id
            }

            fn intent(&self) -> RequestIntent {
                $intent
            }
        }
    };
}

impl_command!(OpenQuote, "quote.open", RequestIntent::ReadWrite);
impl_command!(AddCoverage, "quote.add_coverage", RequestIntent::ReadWrite);
impl_command!(CalculatePremium, "quote.calculate_premium", RequestIntent::ReadWrite);
impl_command!(BindQuote, "quote.bind", RequestIntent::ReadWrite);
impl_command!(GetQuote, "quote.get", RequestIntent::ReadOnly);
