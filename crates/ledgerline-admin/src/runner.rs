//! Wiring of the admin subcommands onto the engine.

use std::sync::Arc;

use ledgerline_core::intent::RequestScope;
use ledgerline_core::observer::EventHandler;
use ledgerline_core::repository::EventRecordStore;
use ledgerline_engine::cancellation::CancellationSignal;
use ledgerline_engine::config::EngineConfig;
use ledgerline_engine::dispatcher::EventDispatcher;
use ledgerline_engine::replay::{ReplayAllEventsForAggregateEntity, ReplayOrchestrator, ReplayRegistry, ReplayReport};
use ledgerline_event_store::{PgEventStore, schema};
use ledgerline_quote::application::projections::{PolicyIssuedOutbox, QuoteSummaryProjection};
use ledgerline_quote::domain::aggregates::Quote;
use ledgerline_quote::domain::events::{QuoteEvent, quote_registry};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::error::AdminError;

/// Replay targets of the quote context.
#[derive(Debug)]
pub struct ReplayTargets {
    /// Registry routing replay commands to entity replayers.
    pub registry: ReplayRegistry,
    /// Quote summary read model fed by the replay.
    pub quote_summaries: Arc<QuoteSummaryProjection>,
    /// Policy-issued emitter fed by the replay.
    pub policy_outbox: Arc<PolicyIssuedOutbox>,
}

/// Registers a replayer for every entity type the admin tool knows about.
///
/// # Errors
///
/// Returns `AdminError::Domain` if a type registry cannot be built.
pub fn build_replay_targets(
    events: Arc<dyn EventRecordStore>,
    config: &EngineConfig,
) -> Result<ReplayTargets, AdminError> {
    let quote_summaries = Arc::new(QuoteSummaryProjection::new());
    let policy_outbox = Arc::new(PolicyIssuedOutbox::new());
    let dispatcher = EventDispatcher::new()
        .with_read_model_writer(Arc::clone(&quote_summaries) as Arc<dyn EventHandler<QuoteEvent>>)
        .with_system_event_emitter(Arc::clone(&policy_outbox) as Arc<dyn EventHandler<QuoteEvent>>);

    let mut registry = ReplayRegistry::new();
    registry.register(Arc::new(ReplayOrchestrator::for_aggregate::<Quote>(
        events,
        Arc::new(quote_registry()?),
        Arc::new(dispatcher),
        config.clone(),
    )));

    Ok(ReplayTargets {
        registry,
        quote_summaries,
        policy_outbox,
    })
}

/// Runs one replay command against `events`.
///
/// # Errors
///
/// Returns `AdminError::Domain` for an unknown entity type, a missing
/// aggregate, or any replay failure.
pub async fn run_replay(
    events: Arc<dyn EventRecordStore>,
    config: &EngineConfig,
    command: &ReplayAllEventsForAggregateEntity,
    cancel: &CancellationSignal,
) -> Result<ReplayReport, AdminError> {
    let targets = build_replay_targets(events, config)?;
    let report = targets
        .registry
        .handle(&RequestScope::new(), command, cancel)
        .await?;
    info!(
        tenant_id = %report.tenant_id,
        aggregate_id = %report.aggregate_id,
        replayed = report.replayed,
        cancelled = report.cancelled,
        "replay finished"
    );
    Ok(report)
}

/// Connects to Postgres.
///
/// # Errors
///
/// Returns `AdminError::Database` if the connection fails.
pub async fn connect(database_url: &str) -> Result<PgPool, AdminError> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    info!("connected to database");
    Ok(pool)
}

/// Creates the storage schema.
///
/// # Errors
///
/// Returns `AdminError::Domain` if a schema statement fails.
pub async fn run_migrate(pool: &PgPool) -> Result<(), AdminError> {
    schema::apply(pool).await?;
    info!("schema applied");
    Ok(())
}

/// Replays against the Postgres event store.
///
/// # Errors
///
/// Same as [`run_replay`].
pub async fn run_replay_pg(
    pool: PgPool,
    config: &EngineConfig,
    command: &ReplayAllEventsForAggregateEntity,
    cancel: &CancellationSignal,
) -> Result<ReplayReport, AdminError> {
    run_replay(Arc::new(PgEventStore::new(pool)), config, command, cancel).await
}
