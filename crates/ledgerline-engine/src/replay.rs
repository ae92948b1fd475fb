//! Projection rebuild by replaying stored events.
//!
//! Replay streams the complete history of one aggregate through the
//! dispatcher with a caller-chosen set of observer categories. Snapshots are
//! never consulted and nothing is appended. The cancellation signal is
//! checked between pages, so a cancelled replay has redispatched exactly a
//! prefix of the history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ledgerline_core::aggregate::AggregateRoot;
use ledgerline_core::command::Command;
use ledgerline_core::error::DomainError;
use ledgerline_core::event::DomainEvent;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::intent::{RequestIntent, RequestScope};
use ledgerline_core::observer::DispatchReport;
use ledgerline_core::repository::{EventRecordStore, EventStream, StoredEvent};
use ledgerline_core::type_registry::TypeRegistry;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cancellation::CancellationSignal;
use crate::codec::decode_event;
use crate::config::{EngineConfig, UnresolvedTypePolicy};
use crate::dispatcher::{DispatchTargets, EventDispatcher};
use crate::guard::intercept;

/// Administrative command: replay every event of one aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayAllEventsForAggregateEntity {
    /// Correlation ID for tracing.
    pub correlation_id: Uuid,
    /// Tenant owning the aggregate.
    pub tenant_id: TenantId,
    /// The aggregate to replay.
    pub aggregate_id: AggregateId,
    /// Registered entity type of the aggregate, e.g. `"quote"`.
    pub entity_type: String,
    /// Deliver to every observer category, overriding the flags below.
    pub dispatch_to_all_observers: bool,
    /// Deliver to generic domain observers.
    pub dispatch_to_observers: bool,
    /// Deliver to read-model writers.
    pub dispatch_to_read_model_writers: bool,
    /// Deliver to system-event emitters.
    pub dispatch_to_system_event_emitters: bool,
}

impl ReplayAllEventsForAggregateEntity {
    /// The observer categories this command enables.
    #[must_use]
    pub fn targets(&self) -> DispatchTargets {
        if self.dispatch_to_all_observers {
            return DispatchTargets::ALL;
        }
        DispatchTargets {
            observers: self.dispatch_to_observers,
            read_model_writers: self.dispatch_to_read_model_writers,
            system_event_emitters: self.dispatch_to_system_event_emitters,
        }
    }
}

impl Command for ReplayAllEventsForAggregateEntity {
    fn command_type(&self) -> &'static str {
        "replay_all_events_for_aggregate_entity"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    // Replay rewrites projections, so it is a write even though the log is untouched.
    fn intent(&self) -> RequestIntent {
        RequestIntent::ReadWrite
    }
}

/// A record set aside because its stored type could not be bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedEvent {
    /// Stored event id.
    pub event_id: Uuid,
    /// Position in the aggregate's history.
    pub sequence_number: i64,
    /// Assembly the record was written under.
    pub stored_assembly_name: String,
    /// Type name the record was written under.
    pub stored_type_name: String,
}

impl From<&StoredEvent> for QuarantinedEvent {
    fn from(stored: &StoredEvent) -> Self {
        Self {
            event_id: stored.event_id,
            sequence_number: stored.sequence_number,
            stored_assembly_name: stored.stored_assembly_name.clone(),
            stored_type_name: stored.stored_type_name.clone(),
        }
    }
}

/// Summary of one replay run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Tenant owning the aggregate.
    pub tenant_id: TenantId,
    /// The replayed aggregate.
    pub aggregate_id: AggregateId,
    /// Entity type the replay was routed to.
    pub entity_type: String,
    /// Events decoded and redispatched.
    pub replayed: usize,
    /// Unbindable events dropped under the `skip` policy.
    pub skipped: usize,
    /// Unbindable events set aside under the `quarantine` policy.
    pub quarantined: Vec<QuarantinedEvent>,
    /// Sequence number of the last event read.
    pub last_sequence_number: i64,
    /// Whether the run stopped early on cancellation.
    pub cancelled: bool,
    /// Observer outcomes across all redispatched events.
    pub dispatch: DispatchReport,
}

impl ReplayReport {
    fn new(tenant_id: TenantId, aggregate_id: AggregateId, entity_type: &str) -> Self {
        Self {
            tenant_id,
            aggregate_id,
            entity_type: entity_type.to_owned(),
            replayed: 0,
            skipped: 0,
            quarantined: Vec::new(),
            last_sequence_number: 0,
            cancelled: false,
            dispatch: DispatchReport::default(),
        }
    }
}

/// Type-erased replay entry point for one entity type.
#[async_trait]
pub trait EntityReplayer: Send + Sync {
    /// Entity type this replayer serves.
    fn entity_type(&self) -> &str;

    /// Replays one aggregate of this entity type.
    async fn replay(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        targets: DispatchTargets,
        cancel: &CancellationSignal,
    ) -> Result<ReplayReport, DomainError>;
}

/// Replays aggregates whose events are `E`.
pub struct ReplayOrchestrator<E: DomainEvent> {
    entity_type: String,
    events: Arc<dyn EventRecordStore>,
    registry: Arc<TypeRegistry>,
    dispatcher: Arc<EventDispatcher<E>>,
    config: EngineConfig,
}

impl<E: DomainEvent> ReplayOrchestrator<E> {
    /// Creates an orchestrator serving `entity_type`.
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        events: Arc<dyn EventRecordStore>,
        registry: Arc<TypeRegistry>,
        dispatcher: Arc<EventDispatcher<E>>,
        config: EngineConfig,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            events,
            registry,
            dispatcher,
            config,
        }
    }

    /// Creates an orchestrator for aggregate type `A`, keyed by its entity type.
    #[must_use]
    pub fn for_aggregate<A>(
        events: Arc<dyn EventRecordStore>,
        registry: Arc<TypeRegistry>,
        dispatcher: Arc<EventDispatcher<E>>,
        config: EngineConfig,
    ) -> Self
    where
        A: AggregateRoot<Event = E>,
    {
        Self::new(A::ENTITY_TYPE, events, registry, dispatcher, config)
    }

    /// Redispatches the complete history of one aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the aggregate has no
    /// events, `DomainError::UnresolvableType` under the `abort` policy, or
    /// any storage or decoding error. Observer failures are reported, not
    /// returned.
    pub async fn replay_aggregate(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        targets: DispatchTargets,
        cancel: &CancellationSignal,
    ) -> Result<ReplayReport, DomainError> {
        let policy = self.config.unresolved_type_policy;
        let mut report = ReplayReport::new(tenant_id, aggregate_id, &self.entity_type);
        let mut stream = EventStream::new(
            self.events.as_ref(),
            tenant_id,
            aggregate_id,
            0,
            self.config.replay_batch_size,
        );

        info!(
            entity_type = %self.entity_type,
            %tenant_id,
            %aggregate_id,
            ?targets,
            "replay started"
        );
        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                warn!(
                    %aggregate_id,
                    position = stream.position(),
                    "replay cancelled"
                );
                break;
            }
            let Some(batch) = stream.next_batch().await? else {
                break;
            };
            for stored in &batch {
                match decode_event::<E>(&self.registry, stored) {
                    Ok(event) => {
                        report.dispatch.merge(self.dispatcher.dispatch(&event, targets).await);
                        report.replayed += 1;
                    }
                    Err(err @ DomainError::UnresolvableType { .. }) => match policy {
                        UnresolvedTypePolicy::Abort => return Err(err),
                        UnresolvedTypePolicy::Skip => {
                            warn!(
                                %aggregate_id,
                                sequence_number = stored.sequence_number,
                                error = %err,
                                "skipping unresolvable event"
                            );
                            report.skipped += 1;
                        }
                        UnresolvedTypePolicy::Quarantine => {
                            warn!(
                                %aggregate_id,
                                sequence_number = stored.sequence_number,
                                error = %err,
                                "quarantining unresolvable event"
                            );
                            report.quarantined.push(QuarantinedEvent::from(stored));
                        }
                    },
                    Err(err) => return Err(err),
                }
            }
            report.last_sequence_number = stream.position();
        }

        if report.last_sequence_number == 0 && !report.cancelled {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        info!(
            entity_type = %self.entity_type,
            %aggregate_id,
            replayed = report.replayed,
            skipped = report.skipped,
            quarantined = report.quarantined.len(),
            failed = report.dispatch.failures.len(),
            cancelled = report.cancelled,
            "replay finished"
        );
        Ok(report)
    }
}

#[async_trait]
impl<E: DomainEvent + 'static> EntityReplayer for ReplayOrchestrator<E> {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    async fn replay(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        targets: DispatchTargets,
        cancel: &CancellationSignal,
    ) -> Result<ReplayReport, DomainError> {
        self.replay_aggregate(tenant_id, aggregate_id, targets, cancel)
            .await
    }
}

/// Routes replay commands to the replayer registered for their entity type.
#[derive(Default)]
pub struct ReplayRegistry {
    replayers: HashMap<String, Arc<dyn EntityReplayer>>,
}

impl ReplayRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `replayer` under its entity type, replacing any previous one.
    pub fn register(&mut self, replayer: Arc<dyn EntityReplayer>) -> &mut Self {
        self.replayers
            .insert(replayer.entity_type().to_owned(), replayer);
        self
    }

    /// Registered entity types, sorted.
    #[must_use]
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.replayers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Handles a replay command inside `scope`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if `scope` is read-only,
    /// `DomainError::Validation` if the entity type is not registered, or any
    /// error from the replay itself.
    pub async fn handle(
        &self,
        scope: &RequestScope,
        command: &ReplayAllEventsForAggregateEntity,
        cancel: &CancellationSignal,
    ) -> Result<ReplayReport, DomainError> {
        intercept(scope, command, || async move {
            let replayer = self.replayers.get(&command.entity_type).ok_or_else(|| {
                DomainError::Validation(format!(
                    "no replayer registered for entity type {}",
                    command.entity_type
                ))
            })?;
            replayer
                .replay(
                    command.tenant_id,
                    command.aggregate_id,
                    command.targets(),
                    cancel,
                )
                .await
        })
        .await
    }
}

impl std::fmt::Debug for ReplayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayRegistry")
            .field("entity_types", &self.entity_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use ledgerline_core::aggregate::AggregateRoot;
    use ledgerline_core::error::DomainError;
    use ledgerline_core::ids::{AggregateId, TenantId};
    use ledgerline_core::intent::{RequestIntent, RequestScope};
    use ledgerline_core::observer::EventHandler;
    use ledgerline_core::repository::{EventRecordStore, StoredEvent};
    use ledgerline_event_store::{InMemoryEventStore, InMemorySnapshotStore};
    use ledgerline_test_support::{
        FixedClock, RecordingEventStore, RecordingHandler, TALLY_ASSEMBLY, Tally, TallyEvent,
        TallyEventKind, tally_registry,
    };
    use uuid::Uuid;

    use super::{EntityReplayer, ReplayAllEventsForAggregateEntity, ReplayOrchestrator, ReplayRegistry};
    use crate::cancellation::{CancellationSignal, CancellationSource};
    use crate::config::{EngineConfig, UnresolvedTypePolicy};
    use crate::dispatcher::{DispatchTargets, EventDispatcher};
    use crate::repository::AggregateRepository;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    /// Running totals keyed by aggregate, guarded by the last applied sequence.
    #[derive(Default)]
    struct TotalsProjection {
        rows: Mutex<HashMap<AggregateId, (i64, i64)>>,
    }

    impl TotalsProjection {
        fn reset(&self) {
            self.rows.lock().unwrap().clear();
        }

        fn snapshot(&self) -> HashMap<AggregateId, (i64, i64)> {
            self.rows.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler<TallyEvent> for TotalsProjection {
        fn name(&self) -> &str {
            "totals"
        }

        async fn handle(
            &self,
            event: &TallyEvent,
            aggregate_id: AggregateId,
            _tenant_id: TenantId,
        ) -> Result<(), DomainError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows.entry(aggregate_id).or_insert((0, 0));
            if event.metadata.sequence_number <= row.0 {
                return Ok(());
            }
            row.0 = event.metadata.sequence_number;
            match event.kind {
                TallyEventKind::Incremented { amount } => row.1 += amount,
                TallyEventKind::Reset => row.1 = 0,
                TallyEventKind::Opened { .. } => {}
            }
            Ok(())
        }
    }

    /// Cancels its source once it has seen `at`.
    struct CancelAt {
        source: Arc<CancellationSource>,
        at: i64,
    }

    #[async_trait]
    impl EventHandler<TallyEvent> for CancelAt {
        fn name(&self) -> &str {
            "cancel-at"
        }

        async fn handle(
            &self,
            event: &TallyEvent,
            _aggregate_id: AggregateId,
            _tenant_id: TenantId,
        ) -> Result<(), DomainError> {
            if event.metadata.sequence_number == self.at {
                self.source.cancel();
            }
            Ok(())
        }
    }

    fn replay_config(policy: UnresolvedTypePolicy, batch: usize) -> EngineConfig {
        EngineConfig {
            replay_batch_size: batch,
            unresolved_type_policy: policy,
            ..EngineConfig::default()
        }
    }

    async fn seeded_store(increments: &[i64]) -> (Arc<InMemoryEventStore>, TenantId, AggregateId) {
        let events = Arc::new(InMemoryEventStore::new());
        let tenant_id = TenantId::new();
        let aggregate_id = AggregateId::new();
        let repo = AggregateRepository::<Tally>::new(
            Arc::clone(&events) as Arc<dyn EventRecordStore>,
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(tally_registry().unwrap()),
            Arc::new(EventDispatcher::new()),
            EngineConfig::default(),
            Arc::new(FixedClock(now())),
        );
        let mut tally = Tally::new(tenant_id, aggregate_id);
        tally.open("visits", now());
        for amount in increments {
            tally.increment(*amount, now());
        }
        repo.save(&mut tally).await.unwrap();
        (events, tenant_id, aggregate_id)
    }

    fn orchestrator(
        events: Arc<dyn EventRecordStore>,
        dispatcher: EventDispatcher<TallyEvent>,
        config: EngineConfig,
    ) -> ReplayOrchestrator<TallyEvent> {
        ReplayOrchestrator::for_aggregate::<Tally>(
            events,
            Arc::new(tally_registry().unwrap()),
            Arc::new(dispatcher),
            config,
        )
    }

    fn foreign_event(tenant_id: TenantId, aggregate_id: AggregateId, sequence_number: i64) -> StoredEvent {
        StoredEvent {
            event_id: Uuid::new_v4(),
            tenant_id,
            aggregate_id,
            sequence_number,
            stored_assembly_name: TALLY_ASSEMBLY.to_owned(),
            stored_type_name: "Audited".to_owned(),
            payload: serde_json::json!({ "by": "ops" }),
            correlation_id: Uuid::new_v4(),
            causation_id: Uuid::new_v4(),
            performing_user_id: None,
            occurred_at: now(),
        }
    }

    async fn store_with_unknown_event() -> (Arc<InMemoryEventStore>, TenantId, AggregateId) {
        let (events, tenant_id, aggregate_id) = seeded_store(&[2]).await;
        events
            .append_events(tenant_id, aggregate_id, 2, &[foreign_event(tenant_id, aggregate_id, 3)])
            .await
            .unwrap();
        (events, tenant_id, aggregate_id)
    }

    #[tokio::test]
    async fn test_replay_into_reset_projection_is_idempotent() {
        // Arrange
        let (events, tenant_id, aggregate_id) = seeded_store(&[2, 3, 5]).await;
        let projection = Arc::new(TotalsProjection::default());
        let replay = orchestrator(
            events,
            EventDispatcher::new()
                .with_read_model_writer(Arc::clone(&projection) as Arc<dyn EventHandler<TallyEvent>>),
            EngineConfig::default(),
        );
        let targets = DispatchTargets::ALL;

        // Act
        replay
            .replay_aggregate(tenant_id, aggregate_id, targets, &CancellationSignal::never())
            .await
            .unwrap();
        let first = projection.snapshot();
        projection.reset();
        replay
            .replay_aggregate(tenant_id, aggregate_id, targets, &CancellationSignal::never())
            .await
            .unwrap();
        let second = projection.snapshot();

        // Assert
        assert_eq!(first, second);
        assert_eq!(first[&aggregate_id], (4, 10));
    }

    #[tokio::test]
    async fn test_replay_reaches_only_requested_categories() {
        // Arrange
        let (events, tenant_id, aggregate_id) = seeded_store(&[1, 1]).await;
        let observer = Arc::new(RecordingHandler::new("observer"));
        let writer = Arc::new(RecordingHandler::new("writer"));
        let emitter = Arc::new(RecordingHandler::new("emitter"));
        let replay = orchestrator(
            Arc::clone(&events) as Arc<dyn EventRecordStore>,
            EventDispatcher::new()
                .with_observer(Arc::clone(&observer) as Arc<dyn EventHandler<TallyEvent>>)
                .with_read_model_writer(Arc::clone(&writer) as Arc<dyn EventHandler<TallyEvent>>)
                .with_system_event_emitter(Arc::clone(&emitter) as Arc<dyn EventHandler<TallyEvent>>),
            EngineConfig::default(),
        );
        let targets = DispatchTargets {
            read_model_writers: true,
            ..DispatchTargets::NONE
        };

        // Act
        let report = replay
            .replay_aggregate(tenant_id, aggregate_id, targets, &CancellationSignal::never())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.replayed, 3);
        assert_eq!(report.last_sequence_number, 3);
        assert_eq!(writer.sequence_numbers(), vec![1, 2, 3]);
        assert!(observer.seen().is_empty());
        assert!(emitter.seen().is_empty());
        assert_eq!(events.stream_len(tenant_id, aggregate_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_replay_of_unknown_aggregate_is_not_found() {
        // Arrange
        let replay = orchestrator(
            Arc::new(InMemoryEventStore::new()),
            EventDispatcher::new(),
            EngineConfig::default(),
        );

        // Act
        let result = replay
            .replay_aggregate(
                TenantId::new(),
                AggregateId::new(),
                DispatchTargets::ALL,
                &CancellationSignal::never(),
            )
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_batches() {
        // Arrange
        let (events, tenant_id, aggregate_id) = seeded_store(&[1, 1, 1, 1]).await;
        let source = Arc::new(CancellationSource::new());
        let recorder = Arc::new(RecordingHandler::new("recorder"));
        let replay = orchestrator(
            events,
            EventDispatcher::new()
                .with_observer(Arc::new(CancelAt {
                    source: Arc::clone(&source),
                    at: 1,
                }) as Arc<dyn EventHandler<TallyEvent>>)
                .with_read_model_writer(Arc::clone(&recorder) as Arc<dyn EventHandler<TallyEvent>>),
            replay_config(UnresolvedTypePolicy::Abort, 2),
        );

        // Act
        let report = replay
            .replay_aggregate(tenant_id, aggregate_id, DispatchTargets::ALL, &source.signal())
            .await
            .unwrap();

        // Assert
        assert!(report.cancelled);
        assert_eq!(report.replayed, 2);
        assert_eq!(report.last_sequence_number, 2);
        assert_eq!(recorder.sequence_numbers(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_replay_cancelled_before_start_dispatches_nothing() {
        // Arrange
        let (events, tenant_id, aggregate_id) = seeded_store(&[1]).await;
        let recorder = Arc::new(RecordingHandler::new("recorder"));
        let replay = orchestrator(
            events,
            EventDispatcher::new()
                .with_observer(Arc::clone(&recorder) as Arc<dyn EventHandler<TallyEvent>>),
            EngineConfig::default(),
        );
        let source = CancellationSource::new();
        source.cancel();

        // Act
        let report = replay
            .replay_aggregate(tenant_id, aggregate_id, DispatchTargets::ALL, &source.signal())
            .await
            .unwrap();

        // Assert
        assert!(report.cancelled);
        assert_eq!(report.replayed, 0);
        assert!(recorder.seen().is_empty());
    }

    #[tokio::test]
    async fn test_abort_policy_fails_on_unresolvable_event() {
        // Arrange
        let (events, tenant_id, aggregate_id) = store_with_unknown_event().await;
        let replay = orchestrator(
            events,
            EventDispatcher::new(),
            replay_config(UnresolvedTypePolicy::Abort, 500),
        );

        // Act
        let result = replay
            .replay_aggregate(tenant_id, aggregate_id, DispatchTargets::ALL, &CancellationSignal::never())
            .await;

        // Assert
        assert!(matches!(
            result,
            Err(DomainError::UnresolvableType { ref type_name, .. }) if type_name == "Audited"
        ));
    }

    #[tokio::test]
    async fn test_skip_policy_drops_unresolvable_event() {
        // Arrange
        let (events, tenant_id, aggregate_id) = store_with_unknown_event().await;
        let recorder = Arc::new(RecordingHandler::new("recorder"));
        let replay = orchestrator(
            events,
            EventDispatcher::new()
                .with_observer(Arc::clone(&recorder) as Arc<dyn EventHandler<TallyEvent>>),
            replay_config(UnresolvedTypePolicy::Skip, 500),
        );

        // Act
        let report = replay
            .replay_aggregate(tenant_id, aggregate_id, DispatchTargets::ALL, &CancellationSignal::never())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.replayed, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.quarantined.is_empty());
        assert_eq!(report.last_sequence_number, 3);
        assert_eq!(recorder.sequence_numbers(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_quarantine_policy_collects_unresolvable_event() {
        // Arrange
        let (events, tenant_id, aggregate_id) = store_with_unknown_event().await;
        let replay = orchestrator(
            events,
            EventDispatcher::new(),
            replay_config(UnresolvedTypePolicy::Quarantine, 500),
        );

        // Act
        let report = replay
            .replay_aggregate(tenant_id, aggregate_id, DispatchTargets::ALL, &CancellationSignal::never())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.replayed, 2);
        assert_eq!(report.quarantined.len(), 1);
        assert_eq!(report.quarantined[0].sequence_number, 3);
        assert_eq!(report.quarantined[0].stored_type_name, "Audited");
    }

    fn replay_command(
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        entity_type: &str,
    ) -> ReplayAllEventsForAggregateEntity {
        ReplayAllEventsForAggregateEntity {
            correlation_id: Uuid::new_v4(),
            tenant_id,
            aggregate_id,
            entity_type: entity_type.to_owned(),
            dispatch_to_all_observers: false,
            dispatch_to_observers: false,
            dispatch_to_read_model_writers: true,
            dispatch_to_system_event_emitters: false,
        }
    }

    #[tokio::test]
    async fn test_registry_routes_command_by_entity_type() {
        // Arrange
        let (events, tenant_id, aggregate_id) = seeded_store(&[7]).await;
        let writer = Arc::new(RecordingHandler::new("writer"));
        let mut registry = ReplayRegistry::new();
        registry.register(Arc::new(orchestrator(
            events,
            EventDispatcher::new()
                .with_read_model_writer(Arc::clone(&writer) as Arc<dyn EventHandler<TallyEvent>>),
            EngineConfig::default(),
        )));
        let command = replay_command(tenant_id, aggregate_id, "tally");

        // Act
        let report = registry
            .handle(&RequestScope::new(), &command, &CancellationSignal::never())
            .await
            .unwrap();

        // Assert
        assert_eq!(registry.entity_types(), vec!["tally"]);
        assert_eq!(report.entity_type, "tally");
        assert_eq!(report.replayed, 2);
        assert_eq!(writer.sequence_numbers(), vec![1, 2]);
    }

    #[test]
    fn test_all_observers_flag_enables_every_category() {
        let command = ReplayAllEventsForAggregateEntity {
            dispatch_to_all_observers: true,
            dispatch_to_read_model_writers: false,
            ..replay_command(TenantId::new(), AggregateId::new(), "tally")
        };

        assert_eq!(command.targets(), DispatchTargets::ALL);
    }

    #[tokio::test]
    async fn test_command_flags_select_categories_through_registry() {
        // (all, observers, writers, emitters) => (observer hits, writer hits, emitter hits)
        let cases = [
            ((true, false, false, false), (true, true, true)),
            ((true, false, true, false), (true, true, true)),
            ((false, true, false, false), (true, false, false)),
            ((false, false, true, false), (false, true, false)),
            ((false, false, false, true), (false, false, true)),
            ((false, true, false, true), (true, false, true)),
            ((false, false, false, false), (false, false, false)),
        ];

        for ((all, observers, writers, emitters), (expect_observer, expect_writer, expect_emitter)) in
            cases
        {
            // Arrange
            let (events, tenant_id, aggregate_id) = seeded_store(&[5]).await;
            let observer = Arc::new(RecordingHandler::new("observer"));
            let writer = Arc::new(RecordingHandler::new("writer"));
            let emitter = Arc::new(RecordingHandler::new("emitter"));
            let mut registry = ReplayRegistry::new();
            registry.register(Arc::new(orchestrator(
                events,
                EventDispatcher::new()
                    .with_observer(Arc::clone(&observer) as Arc<dyn EventHandler<TallyEvent>>)
                    .with_read_model_writer(Arc::clone(&writer) as Arc<dyn EventHandler<TallyEvent>>)
                    .with_system_event_emitter(
                        Arc::clone(&emitter) as Arc<dyn EventHandler<TallyEvent>>
                    ),
                EngineConfig::default(),
            )));
            let command = ReplayAllEventsForAggregateEntity {
                dispatch_to_all_observers: all,
                dispatch_to_observers: observers,
                dispatch_to_read_model_writers: writers,
                dispatch_to_system_event_emitters: emitters,
                ..replay_command(tenant_id, aggregate_id, "tally")
            };

            // Act
            let report = registry
                .handle(&RequestScope::new(), &command, &CancellationSignal::never())
                .await
                .unwrap();

            // Assert
            let flags = (all, observers, writers, emitters);
            assert_eq!(report.replayed, 2, "flags {flags:?}");
            let hits = |handler: &RecordingHandler| handler.sequence_numbers() == vec![1, 2];
            assert_eq!(hits(observer.as_ref()), expect_observer, "observer, flags {flags:?}");
            assert_eq!(hits(writer.as_ref()), expect_writer, "writer, flags {flags:?}");
            assert_eq!(hits(emitter.as_ref()), expect_emitter, "emitter, flags {flags:?}");
            if !expect_observer {
                assert!(observer.seen().is_empty());
            }
            if !expect_writer {
                assert!(writer.seen().is_empty());
            }
            if !expect_emitter {
                assert!(emitter.seen().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_registry_rejects_unknown_entity_type() {
        // Arrange
        let registry = ReplayRegistry::new();
        let command = replay_command(TenantId::new(), AggregateId::new(), "claim");

        // Act
        let result = registry
            .handle(&RequestScope::new(), &command, &CancellationSignal::never())
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_replay_in_read_only_scope_never_touches_the_store() {
        // Arrange
        let store = Arc::new(RecordingEventStore::new(Vec::new()));
        let replayer: Arc<dyn EntityReplayer> = Arc::new(orchestrator(
            Arc::clone(&store) as Arc<dyn EventRecordStore>,
            EventDispatcher::new(),
            EngineConfig::default(),
        ));
        let mut registry = ReplayRegistry::new();
        registry.register(replayer);
        let command = replay_command(TenantId::new(), AggregateId::new(), "tally");
        let scope = RequestScope::tagged(RequestIntent::ReadOnly);

        // Act
        let result = registry
            .handle(&scope, &command, &CancellationSignal::never())
            .await;

        // Assert
        assert!(matches!(result, Err(DomainError::InvalidOperation(_))));
        assert_eq!(store.load_calls(), 0);
    }
}
