//! [`Store`] backed by Postgres through the repositories.

use async_trait::async_trait;
use dispatch_core::types::{DbId, Timestamp};

use crate::models::audit::{NewAuditEntry, TaskAuditEntry};
use crate::models::extension_request::{
    ExtensionFilter, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use crate::models::session::{NewSession, UserSession};
use crate::models::status::{Availability, TaskStatus};
use crate::models::task::{NewTask, Task, TaskFilter};
use crate::models::worker::{NewWorker, Worker};
use crate::repositories::{AuditRepo, ExtensionRequestRepo, SessionRepo, TaskRepo, WorkerRepo};
use crate::store::{AvailabilityStore, ReviewOutcome, Store, StoreResult, TaskCommit};
use crate::DbPool;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> StoreResult<()> {
        Ok(crate::health_check(&self.pool).await?)
    }

    async fn insert_task(
        &self,
        input: &NewTask,
        audit: &NewAuditEntry,
        now: Timestamp,
    ) -> StoreResult<Task> {
        Ok(TaskRepo::create(&self.pool, input, audit, now).await?)
    }

    async fn find_task(&self, id: DbId) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list(&self.pool, filter).await?)
    }

    async fn list_tasks_in(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list_in_statuses(&self.pool, statuses).await?)
    }

    async fn list_active_tasks_for_worker(&self, worker_id: DbId) -> StoreResult<Vec<Task>> {
        Ok(TaskRepo::list_active_for_worker(&self.pool, worker_id).await?)
    }

    async fn commit_task(&self, commit: &TaskCommit<'_>) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::commit(&self.pool, commit).await?)
    }

    async fn set_task_attention(
        &self,
        task_id: DbId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Option<Task>> {
        Ok(TaskRepo::set_attention(&self.pool, task_id, reason, now).await?)
    }

    async fn insert_worker(&self, input: &NewWorker, now: Timestamp) -> StoreResult<Worker> {
        Ok(WorkerRepo::create(&self.pool, input, now).await?)
    }

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        Ok(WorkerRepo::list(&self.pool).await?)
    }

    async fn insert_extension_request(
        &self,
        input: &NewExtensionRequest,
        now: Timestamp,
    ) -> StoreResult<Option<ExtensionRequest>> {
        Ok(ExtensionRequestRepo::create(&self.pool, input, now).await?)
    }

    async fn find_extension_request(&self, id: DbId) -> StoreResult<Option<ExtensionRequest>> {
        Ok(ExtensionRequestRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_pending_extension(
        &self,
        task_id: DbId,
    ) -> StoreResult<Option<ExtensionRequest>> {
        Ok(ExtensionRequestRepo::find_pending_for_task(&self.pool, task_id).await?)
    }

    async fn list_extension_requests(
        &self,
        filter: &ExtensionFilter,
    ) -> StoreResult<Vec<ExtensionRequest>> {
        Ok(ExtensionRequestRepo::list(&self.pool, filter).await?)
    }

    async fn review_extension(
        &self,
        review: &ExtensionReview,
        task: Option<&TaskCommit<'_>>,
    ) -> StoreResult<ReviewOutcome> {
        let mut tx = self.pool.begin().await?;

        // Dropping `tx` without commit rolls back.
        let Some(request) = ExtensionRequestRepo::review_in(&mut *tx, review).await? else {
            return Ok(ReviewOutcome::RequestNotPending);
        };
        let task = match task {
            Some(commit) => match TaskRepo::commit_in(&mut *tx, commit).await? {
                Some(updated) => Some(updated),
                None => return Ok(ReviewOutcome::TaskChanged),
            },
            None => None,
        };

        tx.commit().await?;
        Ok(ReviewOutcome::Reviewed { request, task })
    }

    async fn insert_session(&self, input: &NewSession, now: Timestamp) -> StoreResult<UserSession> {
        Ok(SessionRepo::create(&self.pool, input, now).await?)
    }

    async fn list_sessions_for_user(&self, user_id: DbId) -> StoreResult<Vec<UserSession>> {
        Ok(SessionRepo::list_for_user(&self.pool, user_id).await?)
    }

    async fn touch_sessions(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64> {
        Ok(SessionRepo::touch(&self.pool, user_id, now).await?)
    }

    async fn deactivate_stale_sessions(
        &self,
        now: Timestamp,
        idle_cutoff: Timestamp,
    ) -> StoreResult<Vec<DbId>> {
        Ok(SessionRepo::deactivate_stale(&self.pool, now, idle_cutoff).await?)
    }

    async fn deactivate_sessions_for_user(&self, user_id: DbId) -> StoreResult<u64> {
        Ok(SessionRepo::deactivate_for_user(&self.pool, user_id).await?)
    }

    async fn purge_sessions(&self, before: Timestamp) -> StoreResult<u64> {
        Ok(SessionRepo::purge(&self.pool, before).await?)
    }

    async fn list_audit(&self, task_id: DbId) -> StoreResult<Vec<TaskAuditEntry>> {
        Ok(AuditRepo::list_for_task(&self.pool, task_id).await?)
    }
}

#[async_trait]
impl AvailabilityStore for PgStore {
    async fn write_availability(
        &self,
        worker_id: DbId,
        expected: Availability,
        next: Availability,
        now: Timestamp,
    ) -> StoreResult<Option<Worker>> {
        Ok(WorkerRepo::update_availability(&self.pool, worker_id, expected, next, now).await?)
    }
}
