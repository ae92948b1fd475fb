//! Observer fan-out.
//!
//! For every event the dispatcher calls domain observers, then read-model
//! writers, then system-event emitters, each in registration order. A failing
//! handler never prevents the remaining handlers from running; every failure
//! is collected into the returned [`DispatchReport`].

use std::sync::Arc;

use ledgerline_core::event::DomainEvent;
use ledgerline_core::observer::{DispatchReport, EventHandler, ObserverCategory, ObserverFailure};

/// Which observer categories a dispatch reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchTargets {
    /// Generic domain observers.
    pub observers: bool,
    /// Read-model writers.
    pub read_model_writers: bool,
    /// System-event emitters.
    pub system_event_emitters: bool,
}

impl DispatchTargets {
    /// Every category.
    pub const ALL: Self = Self {
        observers: true,
        read_model_writers: true,
        system_event_emitters: true,
    };

    /// No category.
    pub const NONE: Self = Self {
        observers: false,
        read_model_writers: false,
        system_event_emitters: false,
    };

    /// Returns `true` if `category` is enabled.
    #[must_use]
    pub fn includes(self, category: ObserverCategory) -> bool {
        match category {
            ObserverCategory::DomainObserver => self.observers,
            ObserverCategory::ReadModelWriter => self.read_model_writers,
            ObserverCategory::SystemEventEmitter => self.system_event_emitters,
        }
    }
}

/// Delivers events to registered handlers.
pub struct EventDispatcher<E: DomainEvent> {
    observers: Vec<Arc<dyn EventHandler<E>>>,
    read_model_writers: Vec<Arc<dyn EventHandler<E>>>,
    system_event_emitters: Vec<Arc<dyn EventHandler<E>>>,
}

impl<E: DomainEvent> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
            read_model_writers: Vec::new(),
            system_event_emitters: Vec::new(),
        }
    }
}

impl<E: DomainEvent> std::fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observers", &self.observers.len())
            .field("read_model_writers", &self.read_model_writers.len())
            .field("system_event_emitters", &self.system_event_emitters.len())
            .finish()
    }
}

impl<E: DomainEvent> EventDispatcher<E> {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `category`.
    pub fn register(&mut self, category: ObserverCategory, handler: Arc<dyn EventHandler<E>>) {
        match category {
            ObserverCategory::DomainObserver => self.observers.push(handler),
            ObserverCategory::ReadModelWriter => self.read_model_writers.push(handler),
            ObserverCategory::SystemEventEmitter => self.system_event_emitters.push(handler),
        }
    }

    /// Builder form of [`register`](Self::register) for domain observers.
    #[must_use]
    pub fn with_observer(mut self, handler: Arc<dyn EventHandler<E>>) -> Self {
        self.register(ObserverCategory::DomainObserver, handler);
        self
    }

    /// Builder form of [`register`](Self::register) for read-model writers.
    #[must_use]
    pub fn with_read_model_writer(mut self, handler: Arc<dyn EventHandler<E>>) -> Self {
        self.register(ObserverCategory::ReadModelWriter, handler);
        self
    }

    /// Builder form of [`register`](Self::register) for system-event emitters.
    #[must_use]
    pub fn with_system_event_emitter(mut self, handler: Arc<dyn EventHandler<E>>) -> Self {
        self.register(ObserverCategory::SystemEventEmitter, handler);
        self
    }

    fn handlers(&self, category: ObserverCategory) -> &[Arc<dyn EventHandler<E>>] {
        match category {
            ObserverCategory::DomainObserver => &self.observers,
            ObserverCategory::ReadModelWriter => &self.read_model_writers,
            ObserverCategory::SystemEventEmitter => &self.system_event_emitters,
        }
    }

    /// Dispatches one event to the enabled categories.
    pub async fn dispatch(&self, event: &E, targets: DispatchTargets) -> DispatchReport {
        let meta = event.metadata();
        let mut report = DispatchReport::default();
        for category in ObserverCategory::ALL {
            if !targets.includes(category) {
                continue;
            }
            for handler in self.handlers(category) {
                match handler.handle(event, meta.aggregate_id, meta.tenant_id).await {
                    Ok(()) => report.delivered += 1,
                    Err(err) => {
                        tracing::warn!(
                            observer = handler.name(),
                            %category,
                            aggregate_id = %meta.aggregate_id,
                            sequence_number = meta.sequence_number,
                            error = %err,
                            "observer failed"
                        );
                        report.failures.push(ObserverFailure {
                            observer: handler.name().to_owned(),
                            category,
                            sequence_number: meta.sequence_number,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        tracing::debug!(
            aggregate_id = %meta.aggregate_id,
            sequence_number = meta.sequence_number,
            delivered = report.delivered,
            failed = report.failures.len(),
            "event dispatched"
        );
        report
    }

    /// Dispatches `events` in order, merging the per-event reports.
    pub async fn dispatch_all(&self, events: &[E], targets: DispatchTargets) -> DispatchReport {
        let mut report = DispatchReport::default();
        for event in events {
            report.merge(self.dispatch(event, targets).await);
        }
        report
    }
}
