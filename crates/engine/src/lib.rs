//! Task lifecycle and availability consistency engine.
//!
//! Every component reads through the [`Store`] and writes only with
//! conditional updates, so any number of engine instances can run against
//! one database. Committed changes are published on the [`EventBus`].
//!
//! - [`TaskStateMachine`]: user and system transitions of a single task
//! - [`AvailabilityManager`]: the only writer of worker availability
//! - [`ExtensionNegotiator`]: request, review and direct extension
//! - [`OvertimeDetector`]: periodic overdue scan
//! - [`Reconciler`]: availability and liveness drift repair
//! - [`SessionKeeper`]: session activity, expiry and retention

use std::sync::Arc;

use dispatch_core::clock::Clock;
use dispatch_core::types::Timestamp;
use dispatch_db::{AvailabilityStore, Store};
use dispatch_events::{DomainEvent, EventBus};

pub mod availability;
pub mod config;
pub mod error;
pub mod extension;
mod notify;
pub mod overtime;
pub mod reconciler;
pub mod sessions;
pub mod state_machine;

pub use availability::AvailabilityManager;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use extension::ExtensionNegotiator;
pub use overtime::{OvertimeDetector, ScanReport};
pub use reconciler::{ReconcileReport, Reconciler, WorkerCheck};
pub use sessions::{SessionKeeper, SessionSweepReport};
pub use state_machine::TaskStateMachine;

/// Collaborators shared by every component.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<EngineConfig>,
}

impl EngineContext {
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub(crate) fn publish(&self, event: DomainEvent) {
        self.bus.publish(event);
    }
}

/// The assembled engine.
#[derive(Clone)]
pub struct Engine {
    pub ctx: EngineContext,
    pub tasks: Arc<TaskStateMachine>,
    pub availability: Arc<AvailabilityManager>,
    pub extensions: Arc<ExtensionNegotiator>,
    pub overtime: Arc<OvertimeDetector>,
    pub reconciler: Arc<Reconciler>,
    pub sessions: Arc<SessionKeeper>,
}

impl Engine {
    /// Wire every component over one store. The store's availability
    /// writer is handed to the [`AvailabilityManager`] alone.
    pub fn new<S>(store: Arc<S>, bus: Arc<EventBus>, clock: Arc<dyn Clock>, config: EngineConfig) -> Self
    where
        S: Store + AvailabilityStore + 'static,
    {
        let writer: Arc<dyn AvailabilityStore> = store.clone();
        let ctx = EngineContext {
            store,
            bus,
            clock,
            config: Arc::new(config),
        };

        let availability = Arc::new(AvailabilityManager::new(ctx.clone(), writer));
        let extensions = Arc::new(ExtensionNegotiator::new(ctx.clone()));
        let tasks = Arc::new(TaskStateMachine::new(
            ctx.clone(),
            availability.clone(),
            extensions.clone(),
        ));
        let overtime = Arc::new(OvertimeDetector::new(ctx.clone(), tasks.clone()));
        let reconciler = Arc::new(Reconciler::new(ctx.clone(), availability.clone()));
        let sessions = Arc::new(SessionKeeper::new(ctx.clone(), reconciler.clone()));

        Self {
            ctx,
            tasks,
            availability,
            extensions,
            overtime,
            reconciler,
            sessions,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.ctx.store
    }
}
