#![allow(dead_code)]

pub mod racing;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use dispatch_core::clock::{Clock, ManualClock};
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{Availability, TaskStatus};
use dispatch_core::task_lifecycle::NewTaskSpec;
use dispatch_core::types::DbId;
use dispatch_db::models::task::Task;
use dispatch_db::models::worker::NewWorker;
use dispatch_db::{AvailabilityStore, MemoryStore, Store};
use dispatch_engine::{Engine, EngineConfig};
use dispatch_events::{DomainEvent, EventBus};
use racing::YieldingStore;
use tokio::sync::broadcast;

pub const ADMIN_ID: DbId = 1;
pub const DISPATCHER_ID: DbId = 100;

/// An engine over a fresh `MemoryStore` with a manual clock.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub events: broadcast::Receiver<DomainEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over(store.clone(), store, config)
    }

    /// An engine whose reads yield to the runtime, so operations joined
    /// together interleave between their reads and their commit.
    pub fn racing() -> (Self, Arc<YieldingStore>) {
        let store = Arc::new(MemoryStore::new());
        let yielding = Arc::new(YieldingStore::new(store.clone()));
        let h = Self::over(yielding.clone(), store, EngineConfig::default());
        (h, yielding)
    }

    fn over<S>(engine_store: Arc<S>, store: Arc<MemoryStore>, config: EngineConfig) -> Self
    where
        S: Store + AvailabilityStore + 'static,
    {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        ));
        let bus = Arc::new(EventBus::default());
        let events = bus.subscribe();
        let engine = Engine::new(engine_store, bus, clock.clone(), config);
        Self {
            engine,
            store,
            clock,
            events,
        }
    }

    pub fn dispatcher(&self) -> Actor {
        Actor::new(DISPATCHER_ID, Role::Dispatcher)
    }

    pub fn admin(&self) -> Actor {
        Actor::new(ADMIN_ID, Role::Administrator)
    }

    pub fn clock_now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    /// Register a worker and open a session for it, leaving it idle.
    pub async fn online_worker(&self, id: DbId) -> Actor {
        let now = self.clock.now();
        self.store
            .insert_worker(
                &NewWorker {
                    id,
                    display_name: format!("worker {id}"),
                },
                now,
            )
            .await
            .unwrap();
        self.engine
            .sessions
            .open_session(id, &format!("fp-{id}"), now + Duration::hours(12))
            .await
            .unwrap();
        Actor::new(id, Role::Worker)
    }

    /// Create a pending task owned by the default dispatcher.
    pub async fn task(&self, minutes: i32) -> Task {
        let spec = NewTaskSpec {
            title: "Restock aisle 4".to_string(),
            notes: None,
            allotted_minutes: minutes,
        };
        self.engine.tasks.create(&self.dispatcher(), &spec).await.unwrap()
    }

    /// Create, accept and start a task for `worker`.
    pub async fn running_task(&self, worker: &Actor, minutes: i32) -> Task {
        let task = self.task(minutes).await;
        self.engine.tasks.accept(worker, task.id).await.unwrap();
        self.engine.tasks.start(worker, task.id).await.unwrap()
    }

    pub async fn task_row(&self, id: DbId) -> Task {
        self.store.find_task(id).await.unwrap().unwrap()
    }

    pub async fn availability(&self, worker_id: DbId) -> Availability {
        self.store
            .find_worker(worker_id)
            .await
            .unwrap()
            .unwrap()
            .availability
    }

    /// Every event published since the last drain.
    pub fn drain(&mut self) -> Vec<DomainEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Names of every event published since the last drain.
    pub fn drain_names(&mut self) -> Vec<String> {
        self.drain().into_iter().map(|e| e.event_name).collect()
    }

    /// Assert both availability invariants over every stored row.
    pub async fn assert_invariants(&self) {
        let tasks = self
            .store
            .list_tasks_in(TaskStatus::ALL)
            .await
            .unwrap();
        for task in &tasks {
            assert_eq!(
                task.worker_id.is_some(),
                task.status.is_active(),
                "task {} is {} with worker {:?}",
                task.id,
                task.status,
                task.worker_id
            );
        }
        for worker in self.store.list_workers().await.unwrap() {
            let active = tasks
                .iter()
                .filter(|t| t.worker_id == Some(worker.id))
                .count();
            assert!(active <= 1, "worker {} holds {active} tasks", worker.id);
            if worker.availability != Availability::Offline {
                assert_eq!(
                    worker.availability == Availability::Busy,
                    active == 1,
                    "worker {} is {} with {active} active tasks",
                    worker.id,
                    worker.availability
                );
            }
        }
    }
}
