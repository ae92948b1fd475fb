//! Command line definition.

use clap::{Args, Parser, Subcommand};
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_engine::replay::ReplayAllEventsForAggregateEntity;
use uuid::Uuid;

use crate::error::AdminError;

#[derive(Debug, Parser)]
#[command(name = "ledgerline-admin")]
#[command(about = "Ledgerline event store administration")]
pub struct Cli {
    #[clap(long, env = "DATABASE_URL")]
    pub database_url: String,

    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(Debug, Subcommand)]
pub enum AdminCommand {
    /// Create the event and snapshot tables if they do not exist.
    Migrate,
    /// Redispatch the full history of one aggregate to its observers.
    Replay(ReplayArgs),
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    #[arg(long)]
    pub tenant_id: TenantId,

    #[arg(long)]
    pub aggregate_id: AggregateId,

    #[arg(long, default_value = "quote")]
    pub entity_type: String,

    /// Dispatch to every observer category.
    #[arg(long)]
    pub all: bool,

    /// Dispatch to generic domain observers.
    #[arg(long)]
    pub observers: bool,

    /// Dispatch to read-model writers.
    #[arg(long)]
    pub read_model_writers: bool,

    /// Dispatch to system-event emitters.
    #[arg(long)]
    pub system_event_emitters: bool,
}

impl ReplayArgs {
    /// Builds the replay command with a fresh correlation id.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Config` if no dispatch target was selected.
    pub fn into_command(self) -> Result<ReplayAllEventsForAggregateEntity, AdminError> {
        if !(self.all || self.observers || self.read_model_writers || self.system_event_emitters) {
            return Err(AdminError::Config(
                "select at least one of --all, --observers, --read-model-writers, --system-event-emitters"
                    .to_owned(),
            ));
        }
        Ok(ReplayAllEventsForAggregateEntity {
            correlation_id: Uuid::now_v7(),
            tenant_id: self.tenant_id,
            aggregate_id: self.aggregate_id,
            entity_type: self.entity_type,
            dispatch_to_all_observers: self.all,
            dispatch_to_observers: self.observers,
            dispatch_to_read_model_writers: self.read_model_writers,
            dispatch_to_system_event_emitters: self.system_event_emitters,
        })
    }
}
