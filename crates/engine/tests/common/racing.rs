//! A store that hands control back to the runtime after every read.
//!
//! Two operations driven by `tokio::join!` over a `YieldingStore` advance
//! in lockstep: both finish their reads before either commits, so the
//! second commit meets a row that moved on underneath it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dispatch_core::types::{DbId, Timestamp};
use dispatch_db::models::audit::{NewAuditEntry, TaskAuditEntry};
use dispatch_db::models::extension_request::{
    ExtensionFilter, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use dispatch_db::models::session::{NewSession, UserSession};
use dispatch_db::models::status::{Availability, TaskStatus};
use dispatch_db::models::task::{NewTask, Task, TaskFilter};
use dispatch_db::models::worker::{NewWorker, Worker};
use dispatch_db::store::UQ_ACTIVE_WORKER;
use dispatch_db::{
    AvailabilityStore, MemoryStore, ReviewOutcome, Store, StoreResult, TaskCommit,
};

pub struct YieldingStore {
    inner: Arc<MemoryStore>,
    lost_swaps: AtomicUsize,
    worker_clashes: AtomicUsize,
}

impl YieldingStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            lost_swaps: AtomicUsize::new(0),
            worker_clashes: AtomicUsize::new(0),
        }
    }

    /// Task commits that found the row already changed.
    pub fn lost_swaps(&self) -> usize {
        self.lost_swaps.load(Ordering::SeqCst)
    }

    /// Task commits refused by the one-active-task-per-worker index.
    pub fn worker_clashes(&self) -> usize {
        self.worker_clashes.load(Ordering::SeqCst)
    }
}

async fn after_read<T>(value: T) -> T {
    tokio::task::yield_now().await;
    value
}

#[async_trait]
impl Store for YieldingStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    async fn insert_task(
        &self,
        input: &NewTask,
        audit: &NewAuditEntry,
        now: Timestamp,
    ) -> StoreResult<Task> {
        self.inner.insert_task(input, audit, now).await
    }

    async fn find_task(&self, id: DbId) -> StoreResult<Option<Task>> {
        after_read(self.inner.find_task(id).await).await
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        after_read(self.inner.list_tasks(filter).await).await
    }

    async fn list_tasks_in(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>> {
        after_read(self.inner.list_tasks_in(statuses).await).await
    }

    async fn list_active_tasks_for_worker(&self, worker_id: DbId) -> StoreResult<Vec<Task>> {
        after_read(self.inner.list_active_tasks_for_worker(worker_id).await).await
    }

    async fn commit_task(&self, commit: &TaskCommit<'_>) -> StoreResult<Option<Task>> {
        let result = self.inner.commit_task(commit).await;
        match &result {
            Ok(None) => {
                self.lost_swaps.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) if e.is_unique_violation(UQ_ACTIVE_WORKER) => {
                self.worker_clashes.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        result
    }

    async fn set_task_attention(
        &self,
        task_id: DbId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Option<Task>> {
        self.inner.set_task_attention(task_id, reason, now).await
    }

    async fn insert_worker(&self, input: &NewWorker, now: Timestamp) -> StoreResult<Worker> {
        self.inner.insert_worker(input, now).await
    }

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>> {
        after_read(self.inner.find_worker(id).await).await
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        after_read(self.inner.list_workers().await).await
    }

    async fn insert_extension_request(
        &self,
        input: &NewExtensionRequest,
        now: Timestamp,
    ) -> StoreResult<Option<ExtensionRequest>> {
        self.inner.insert_extension_request(input, now).await
    }

    async fn find_extension_request(&self, id: DbId) -> StoreResult<Option<ExtensionRequest>> {
        after_read(self.inner.find_extension_request(id).await).await
    }

    async fn find_pending_extension(
        &self,
        task_id: DbId,
    ) -> StoreResult<Option<ExtensionRequest>> {
        after_read(self.inner.find_pending_extension(task_id).await).await
    }

    async fn list_extension_requests(
        &self,
        filter: &ExtensionFilter,
    ) -> StoreResult<Vec<ExtensionRequest>> {
        after_read(self.inner.list_extension_requests(filter).await).await
    }

    async fn review_extension(
        &self,
        review: &ExtensionReview,
        task: Option<&TaskCommit<'_>>,
    ) -> StoreResult<ReviewOutcome> {
        self.inner.review_extension(review, task).await
    }

    async fn insert_session(&self, input: &NewSession, now: Timestamp) -> StoreResult<UserSession> {
        self.inner.insert_session(input, now).await
    }

    async fn list_sessions_for_user(&self, user_id: DbId) -> StoreResult<Vec<UserSession>> {
        after_read(self.inner.list_sessions_for_user(user_id).await).await
    }

    async fn touch_sessions(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64> {
        self.inner.touch_sessions(user_id, now).await
    }

    async fn deactivate_stale_sessions(
        &self,
        now: Timestamp,
        idle_cutoff: Timestamp,
    ) -> StoreResult<Vec<DbId>> {
        self.inner.deactivate_stale_sessions(now, idle_cutoff).await
    }

    async fn deactivate_sessions_for_user(&self, user_id: DbId) -> StoreResult<u64> {
        self.inner.deactivate_sessions_for_user(user_id).await
    }

    async fn purge_sessions(&self, before: Timestamp) -> StoreResult<u64> {
        self.inner.purge_sessions(before).await
    }

    async fn list_audit(&self, task_id: DbId) -> StoreResult<Vec<TaskAuditEntry>> {
        after_read(self.inner.list_audit(task_id).await).await
    }
}

#[async_trait]
impl AvailabilityStore for YieldingStore {
    async fn write_availability(
        &self,
        worker_id: DbId,
        expected: Availability,
        next: Availability,
        now: Timestamp,
    ) -> StoreResult<Option<Worker>> {
        self.inner
            .write_availability(worker_id, expected, next, now)
            .await
    }
}
