//! Aggregate repository.
//!
//! Loads aggregates from the latest snapshot plus trailing events and saves
//! their uncommitted events with an optimistic concurrency check. After a
//! successful append the new events are dispatched to every observer
//! category and a snapshot is taken once enough events have accumulated.

use std::sync::Arc;

use ledgerline_core::aggregate::Snapshotting;
use ledgerline_core::clock::Clock;
use ledgerline_core::error::DomainError;
use ledgerline_core::ids::{AggregateId, TenantId};
use ledgerline_core::observer::DispatchReport;
use ledgerline_core::repository::{EventRecordStore, EventStream, StoredEvent};
use ledgerline_core::snapshot::{Snapshot, SnapshotStore};
use ledgerline_core::type_registry::TypeRegistry;
use tracing::{debug, info, warn};

use crate::codec::{decode_event, encode_event};
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchTargets, EventDispatcher};

/// Result of a successful [`AggregateRepository::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// Stored version after the append.
    pub new_version: i64,
    /// Number of events appended.
    pub committed: usize,
    /// Observer outcomes for the committed events.
    pub dispatch: DispatchReport,
    /// Whether a snapshot was written after the commit.
    pub snapshot_taken: bool,
}

/// Load/save orchestration for one aggregate type.
pub struct AggregateRepository<A: Snapshotting> {
    events: Arc<dyn EventRecordStore>,
    snapshots: Arc<dyn SnapshotStore>,
    registry: Arc<TypeRegistry>,
    dispatcher: Arc<EventDispatcher<A::Event>>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
}

impl<A: Snapshotting> std::fmt::Debug for AggregateRepository<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateRepository")
            .field("entity_type", &A::ENTITY_TYPE)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<A: Snapshotting> Clone for AggregateRepository<A> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            snapshots: Arc::clone(&self.snapshots),
            registry: Arc::clone(&self.registry),
            dispatcher: Arc::clone(&self.dispatcher),
            config: self.config.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<A: Snapshotting> AggregateRepository<A> {
    /// Creates a repository over the given stores.
    #[must_use]
    pub fn new(
        events: Arc<dyn EventRecordStore>,
        snapshots: Arc<dyn SnapshotStore>,
        registry: Arc<TypeRegistry>,
        dispatcher: Arc<EventDispatcher<A::Event>>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            events,
            snapshots,
            registry,
            dispatcher,
            config,
            clock,
        }
    }

    /// The configuration this repository runs with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Loads an aggregate from its latest snapshot plus trailing events.
    ///
    /// A snapshot whose state type cannot be bound, or whose state fails to
    /// deserialize, is ignored and the aggregate is rebuilt from version 0.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if there is neither a snapshot
    /// nor any event, `DomainError::UnresolvableType` if a stored event cannot
    /// be bound, or any storage error.
    pub async fn get_by_id(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<A, DomainError> {
        let from_snapshot = self.restore_snapshot(tenant_id, aggregate_id).await?;
        let had_snapshot = from_snapshot.is_some();
        let mut aggregate = from_snapshot.unwrap_or_else(|| A::new(tenant_id, aggregate_id));
        let applied = self.apply_trailing_events(&mut aggregate).await?;
        if !had_snapshot && applied == 0 {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        debug!(
            entity_type = A::ENTITY_TYPE,
            %tenant_id,
            %aggregate_id,
            version = aggregate.version(),
            from_snapshot = had_snapshot,
            "aggregate loaded"
        );
        Ok(aggregate)
    }

    /// Loads an aggregate by replaying every event from version 0.
    ///
    /// # Errors
    ///
    /// Same as [`get_by_id`](Self::get_by_id).
    pub async fn get_by_id_full_replay(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<A, DomainError> {
        let mut aggregate = A::new(tenant_id, aggregate_id);
        if self.apply_trailing_events(&mut aggregate).await? == 0 {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        Ok(aggregate)
    }

    /// Appends the aggregate's uncommitted events, dispatches them and marks
    /// the aggregate committed.
    ///
    /// Observer failures and snapshot write failures do not fail the save;
    /// they are reported in the returned [`SaveOutcome`] and logged.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the stored version moved
    /// since the aggregate was loaded. The aggregate is left untouched so the
    /// caller can decide whether to reload and retry.
    pub async fn save(&self, aggregate: &mut A) -> Result<SaveOutcome, DomainError> {
        let tenant_id = aggregate.tenant_id();
        let aggregate_id = aggregate.aggregate_id();
        let uncommitted = aggregate.uncommitted_events();
        if uncommitted.is_empty() {
            return Ok(SaveOutcome {
                new_version: aggregate.version(),
                committed: 0,
                dispatch: DispatchReport::default(),
                snapshot_taken: false,
            });
        }

        let count = i64::try_from(uncommitted.len())
            .map_err(|_| DomainError::InvalidOperation("too many uncommitted events".to_owned()))?;
        let expected_version = aggregate.version() - count;
        if expected_version < 0 {
            return Err(DomainError::InvalidOperation(format!(
                "aggregate {aggregate_id} is at version {} with {count} uncommitted events",
                aggregate.version()
            )));
        }

        let records = uncommitted
            .iter()
            .map(|event| encode_event(&self.registry, event))
            .collect::<Result<Vec<StoredEvent>, _>>()?;

        let new_version = match self
            .events
            .append_events(tenant_id, aggregate_id, expected_version, &records)
            .await
        {
            Ok(version) => version,
            Err(err) => {
                if err.is_concurrency_conflict() {
                    warn!(
                        entity_type = A::ENTITY_TYPE,
                        %tenant_id,
                        %aggregate_id,
                        expected_version,
                        error = %err,
                        "save rejected"
                    );
                }
                return Err(err);
            }
        };
        info!(
            entity_type = A::ENTITY_TYPE,
            %tenant_id,
            %aggregate_id,
            new_version,
            committed = records.len(),
            "events committed"
        );

        let dispatch = self
            .dispatcher
            .dispatch_all(uncommitted, DispatchTargets::ALL)
            .await;
        aggregate.mark_committed();

        let snapshot_taken = self.snapshot_on_cadence(aggregate, new_version).await;

        Ok(SaveOutcome {
            new_version,
            committed: records.len(),
            dispatch,
            snapshot_taken,
        })
    }

    /// Writes a snapshot of the aggregate at its current version.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidOperation` if the aggregate has
    /// uncommitted events, `DomainError::UnresolvableType` if its state type
    /// is not registered, or any snapshot store error.
    pub async fn take_snapshot(&self, aggregate: &A) -> Result<(), DomainError> {
        if !aggregate.uncommitted_events().is_empty() {
            return Err(DomainError::InvalidOperation(format!(
                "cannot snapshot aggregate {} with uncommitted events",
                aggregate.aggregate_id()
            )));
        }
        let (state_assembly_name, state_type_name) =
            self.registry.bind_to_name(&A::state_type())?;
        let snapshot = Snapshot {
            tenant_id: aggregate.tenant_id(),
            aggregate_id: aggregate.aggregate_id(),
            version: aggregate.version(),
            state_assembly_name,
            state_type_name,
            state: aggregate.snapshot_state()?,
            taken_at: self.clock.now(),
        };
        self.snapshots.save_snapshot(snapshot).await
    }

    async fn snapshot_on_cadence(&self, aggregate: &A, new_version: i64) -> bool {
        let interval = self.config.snapshot_interval;
        if interval <= 0 {
            return false;
        }
        let tenant_id = aggregate.tenant_id();
        let aggregate_id = aggregate.aggregate_id();
        let last = match self
            .snapshots
            .latest_snapshot_version(tenant_id, aggregate_id)
            .await
        {
            Ok(version) => version,
            Err(err) => {
                warn!(%aggregate_id, error = %err, "could not read snapshot version");
                return false;
            }
        };
        if new_version - last < interval {
            return false;
        }
        match self.take_snapshot(aggregate).await {
            Ok(()) => {
                info!(%tenant_id, %aggregate_id, version = new_version, "snapshot taken");
                true
            }
            Err(err) => {
                warn!(%aggregate_id, version = new_version, error = %err, "snapshot failed");
                false
            }
        }
    }

    async fn restore_snapshot(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
    ) -> Result<Option<A>, DomainError> {
        let Some(snapshot) = self
            .snapshots
            .get_latest_snapshot(tenant_id, aggregate_id)
            .await?
        else {
            return Ok(None);
        };
        let version = snapshot.version;
        match self.hydrate(tenant_id, aggregate_id, snapshot) {
            Ok(aggregate) => Ok(Some(aggregate)),
            Err(err) => {
                warn!(
                    %aggregate_id,
                    version,
                    error = %err,
                    "ignoring unusable snapshot, replaying from start"
                );
                Ok(None)
            }
        }
    }

    fn hydrate(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        snapshot: Snapshot,
    ) -> Result<A, DomainError> {
        let binding = self
            .registry
            .bind_to_type(&snapshot.state_assembly_name, &snapshot.state_type_name)?;
        if binding != A::state_type() {
            return Err(DomainError::unresolvable(
                snapshot.state_assembly_name,
                snapshot.state_type_name,
            ));
        }
        A::from_snapshot(tenant_id, aggregate_id, snapshot.version, snapshot.state)
    }

    async fn apply_trailing_events(&self, aggregate: &mut A) -> Result<usize, DomainError> {
        let mut stream = EventStream::new(
            self.events.as_ref(),
            aggregate.tenant_id(),
            aggregate.aggregate_id(),
            aggregate.version(),
            self.config.replay_batch_size,
        );
        let mut applied = 0;
        while let Some(batch) = stream.next_batch().await? {
            for stored in &batch {
                let event: A::Event = decode_event(&self.registry, stored)?;
                aggregate.apply(&event);
                if aggregate.version() != stored.sequence_number {
                    return Err(DomainError::Infrastructure(format!(
                        "aggregate {} reached version {} after applying event {}",
                        stored.aggregate_id,
                        aggregate.version(),
                        stored.sequence_number
                    )));
                }
                applied += 1;
            }
        }
        Ok(applied)
    }
}
