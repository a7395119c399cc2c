//! In-process [`Store`] with the same guards as the Postgres schema.
//!
//! Every operation runs under a single mutex, so each call is atomic in
//! the way a single statement or transaction is in Postgres: version and
//! status checks on task commits, both partial unique indexes, and the
//! conditional availability write.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use dispatch_core::types::{DbId, Timestamp};

use crate::models::audit::{NewAuditEntry, TaskAuditEntry};
use crate::models::extension_request::{
    ExtensionFilter, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use crate::models::session::{NewSession, UserSession};
use crate::models::status::{Availability, ExtensionStatus, TaskStatus};
use crate::models::task::{NewTask, Task, TaskFilter};
use crate::models::worker::{NewWorker, Worker};
use crate::store::{
    AvailabilityStore, ReviewOutcome, Store, StoreError, StoreResult, TaskCommit, PK_WORKERS,
    UQ_ACTIVE_WORKER, UQ_PENDING_EXTENSION,
};

#[derive(Debug, Default)]
struct Tables {
    tasks: BTreeMap<DbId, Task>,
    workers: BTreeMap<DbId, Worker>,
    extensions: BTreeMap<DbId, ExtensionRequest>,
    sessions: BTreeMap<DbId, UserSession>,
    audit: Vec<TaskAuditEntry>,
    next_id: DbId,
    /// Task ids whose commits fail with `Unavailable`.
    failing_tasks: HashSet<DbId>,
    /// Audit writes fail with `Unavailable`.
    failing_audit: bool,
    offline: bool,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    fn check_audit_writable(&self) -> StoreResult<()> {
        if self.failing_audit {
            return Err(StoreError::Unavailable("audit write failed".to_string()));
        }
        Ok(())
    }

    /// Apply a task commit, mirroring `TaskRepo::commit_in`.
    fn commit(&mut self, commit: &TaskCommit<'_>) -> StoreResult<Option<Task>> {
        let id = commit.expected.id;
        if self.failing_tasks.contains(&id) {
            return Err(StoreError::Unavailable(format!("task {id} commit failed")));
        }
        let Some(current) = self.tasks.get(&id) else {
            return Ok(None);
        };
        if current.version != commit.expected.version || current.status != commit.expected.status
        {
            return Ok(None);
        }
        self.check_audit_writable()?;

        let next = commit.next;
        if let (true, Some(worker_id)) = (next.status.is_active(), next.worker_id) {
            let clash = self.tasks.values().any(|t| {
                t.id != id && t.status.is_active() && t.worker_id == Some(worker_id)
            });
            if clash {
                return Err(StoreError::UniqueViolation {
                    constraint: UQ_ACTIVE_WORKER.to_string(),
                });
            }
        }

        let mut updated = current.clone();
        updated.status = next.status;
        updated.worker_id = next.worker_id;
        updated.released_worker_id = next.released_worker_id;
        updated.allotted_minutes = next.allotted_minutes;
        updated.accepted_at = next.accepted_at;
        updated.started_at = next.started_at;
        updated.paused_at = next.paused_at;
        updated.paused_secs = next.paused_secs;
        updated.overtime_at = next.overtime_at;
        updated.pre_overtime_status_id = next.pre_overtime_status_id;
        updated.completed_at = next.completed_at;
        updated.cancelled_at = next.cancelled_at;
        if commit.clear_attention {
            updated.attention_reason = None;
        }
        updated.updated_at = next.updated_at;
        updated.version += 1;

        self.tasks.insert(id, updated.clone());
        self.append_audit(commit.audit, next.updated_at);
        Ok(Some(updated))
    }

    fn append_audit(&mut self, entry: &NewAuditEntry, now: Timestamp) {
        let row = TaskAuditEntry {
            id: self.next_id(),
            task_id: entry.task_id,
            actor_id: entry.actor_id,
            action: entry.action.clone(),
            details: entry.details.clone(),
            created_at: now,
        };
        self.audit.push(row);
    }
}

/// A [`Store`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every commit touching `task_id` fail with `Unavailable`.
    pub fn fail_commits_for(&self, task_id: DbId) {
        self.lock().failing_tasks.insert(task_id);
    }

    /// Make every audit write fail with `Unavailable`, together with the
    /// task write it belongs to.
    pub fn fail_audit_writes(&self, failing: bool) {
        self.lock().failing_audit = failing;
    }

    /// Make every call fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Overwrite a stored worker row, bypassing every guard. Used to
    /// simulate drift left behind by a crashed writer.
    pub fn force_worker(&self, worker: Worker) {
        self.lock().workers.insert(worker.id, worker);
    }

    /// Overwrite a stored task row, bypassing every guard.
    pub fn force_task(&self, task: Task) {
        self.lock().tasks.insert(task.id, task);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.lock().check_online()
    }

    async fn insert_task(
        &self,
        input: &NewTask,
        audit: &NewAuditEntry,
        now: Timestamp,
    ) -> StoreResult<Task> {
        let mut t = self.lock();
        t.check_online()?;
        t.check_audit_writable()?;
        let task = Task {
            id: t.next_id(),
            title: input.title.clone(),
            notes: input.notes.clone(),
            status: TaskStatus::Pending,
            dispatcher_id: input.dispatcher_id,
            worker_id: None,
            released_worker_id: None,
            allotted_minutes: input.allotted_minutes,
            original_minutes: input.allotted_minutes,
            accepted_at: None,
            started_at: None,
            paused_at: None,
            paused_secs: 0,
            overtime_at: None,
            pre_overtime_status_id: None,
            completed_at: None,
            cancelled_at: None,
            attention_reason: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        t.tasks.insert(task.id, task.clone());
        let entry = NewAuditEntry {
            task_id: task.id,
            ..audit.clone()
        };
        t.append_audit(&entry, now);
        Ok(task)
    }

    async fn find_task(&self, id: DbId) -> StoreResult<Option<Task>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.tasks.get(&id).cloned())
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let t = self.lock();
        t.check_online()?;
        let (limit, offset) = filter.page();
        Ok(t.tasks
            .values()
            .rev()
            .filter(|task| filter.matches(task))
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn list_tasks_in(&self, statuses: &[TaskStatus]) -> StoreResult<Vec<Task>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.tasks
            .values()
            .filter(|task| statuses.contains(&task.status))
            .cloned()
            .collect())
    }

    async fn list_active_tasks_for_worker(&self, worker_id: DbId) -> StoreResult<Vec<Task>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.tasks
            .values()
            .filter(|task| task.status.is_active() && task.worker_id == Some(worker_id))
            .cloned()
            .collect())
    }

    async fn commit_task(&self, commit: &TaskCommit<'_>) -> StoreResult<Option<Task>> {
        let mut t = self.lock();
        t.check_online()?;
        t.commit(commit)
    }

    async fn set_task_attention(
        &self,
        task_id: DbId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> StoreResult<Option<Task>> {
        let mut t = self.lock();
        t.check_online()?;
        let Some(task) = t.tasks.get_mut(&task_id) else {
            return Ok(None);
        };
        if task.status.is_terminal() || task.attention_reason.as_deref() == reason {
            return Ok(None);
        }
        task.attention_reason = reason.map(str::to_string);
        task.updated_at = now;
        Ok(Some(task.clone()))
    }

    async fn insert_worker(&self, input: &NewWorker, now: Timestamp) -> StoreResult<Worker> {
        let mut t = self.lock();
        t.check_online()?;
        if t.workers.contains_key(&input.id) {
            return Err(StoreError::UniqueViolation {
                constraint: PK_WORKERS.to_string(),
            });
        }
        let worker = Worker {
            id: input.id,
            display_name: input.display_name.clone(),
            availability: Availability::Offline,
            availability_changed_at: now,
            created_at: now,
            updated_at: now,
        };
        t.workers.insert(worker.id, worker.clone());
        Ok(worker)
    }

    async fn find_worker(&self, id: DbId) -> StoreResult<Option<Worker>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.workers.get(&id).cloned())
    }

    async fn list_workers(&self) -> StoreResult<Vec<Worker>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.workers.values().cloned().collect())
    }

    async fn insert_extension_request(
        &self,
        input: &NewExtensionRequest,
        now: Timestamp,
    ) -> StoreResult<Option<ExtensionRequest>> {
        let mut t = self.lock();
        t.check_online()?;
        let open = t
            .tasks
            .get(&input.task_id)
            .is_some_and(|task| task.status.accepts_extension());
        if !open {
            return Ok(None);
        }
        let duplicate = t
            .extensions
            .values()
            .any(|r| r.task_id == input.task_id && r.status == ExtensionStatus::Pending);
        if duplicate {
            return Err(StoreError::UniqueViolation {
                constraint: UQ_PENDING_EXTENSION.to_string(),
            });
        }
        let request = ExtensionRequest {
            id: t.next_id(),
            task_id: input.task_id,
            worker_id: input.worker_id,
            reviewer_id: None,
            requested_minutes: input.requested_minutes,
            reason: input.reason.clone(),
            status: ExtensionStatus::Pending,
            review_reason: None,
            created_at: now,
            reviewed_at: None,
        };
        t.extensions.insert(request.id, request.clone());
        Ok(Some(request))
    }

    async fn find_extension_request(&self, id: DbId) -> StoreResult<Option<ExtensionRequest>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.extensions.get(&id).cloned())
    }

    async fn find_pending_extension(
        &self,
        task_id: DbId,
    ) -> StoreResult<Option<ExtensionRequest>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.extensions
            .values()
            .find(|r| r.task_id == task_id && r.status == ExtensionStatus::Pending)
            .cloned())
    }

    async fn list_extension_requests(
        &self,
        filter: &ExtensionFilter,
    ) -> StoreResult<Vec<ExtensionRequest>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.extensions
            .values()
            .rev()
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .filter(|r| filter.task_id.is_none_or(|id| r.task_id == id))
            .filter(|r| filter.worker_id.is_none_or(|id| r.worker_id == id))
            .filter(|r| {
                filter.dispatcher_id.is_none_or(|id| {
                    t.tasks.get(&r.task_id).is_some_and(|task| task.dispatcher_id == id)
                })
            })
            .cloned()
            .collect())
    }

    async fn review_extension(
        &self,
        review: &ExtensionReview,
        task: Option<&TaskCommit<'_>>,
    ) -> StoreResult<ReviewOutcome> {
        let mut t = self.lock();
        t.check_online()?;
        let pending = t
            .extensions
            .get(&review.request_id)
            .is_some_and(|r| r.status == ExtensionStatus::Pending);
        if !pending {
            return Ok(ReviewOutcome::RequestNotPending);
        }

        // The task commit goes first so a lost race leaves the request
        // untouched, as a rolled-back transaction would.
        let task = match task {
            Some(commit) => match t.commit(commit)? {
                Some(updated) => Some(updated),
                None => return Ok(ReviewOutcome::TaskChanged),
            },
            None => None,
        };

        let Some(request) = t.extensions.get_mut(&review.request_id) else {
            return Ok(ReviewOutcome::RequestNotPending);
        };
        request.status = review.status;
        request.reviewer_id = review.reviewer_id;
        request.review_reason = review.review_reason.clone();
        request.reviewed_at = Some(review.reviewed_at);
        Ok(ReviewOutcome::Reviewed {
            request: request.clone(),
            task,
        })
    }

    async fn insert_session(&self, input: &NewSession, now: Timestamp) -> StoreResult<UserSession> {
        let mut t = self.lock();
        t.check_online()?;
        let session = UserSession {
            id: t.next_id(),
            user_id: input.user_id,
            token_fingerprint: input.token_fingerprint.clone(),
            expires_at: input.expires_at,
            last_activity_at: now,
            is_active: true,
            created_at: now,
        };
        t.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn list_sessions_for_user(&self, user_id: DbId) -> StoreResult<Vec<UserSession>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn touch_sessions(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64> {
        let mut t = self.lock();
        t.check_online()?;
        let mut touched = 0;
        for s in t.sessions.values_mut() {
            if s.user_id == user_id && s.is_active && s.expires_at > now {
                s.last_activity_at = now;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn deactivate_stale_sessions(
        &self,
        now: Timestamp,
        idle_cutoff: Timestamp,
    ) -> StoreResult<Vec<DbId>> {
        let mut t = self.lock();
        t.check_online()?;
        let mut users = Vec::new();
        for s in t.sessions.values_mut() {
            if s.is_active && (s.expires_at <= now || s.last_activity_at < idle_cutoff) {
                s.is_active = false;
                users.push(s.user_id);
            }
        }
        users.sort_unstable();
        users.dedup();
        Ok(users)
    }

    async fn deactivate_sessions_for_user(&self, user_id: DbId) -> StoreResult<u64> {
        let mut t = self.lock();
        t.check_online()?;
        let mut count = 0;
        for s in t.sessions.values_mut() {
            if s.user_id == user_id && s.is_active {
                s.is_active = false;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn purge_sessions(&self, before: Timestamp) -> StoreResult<u64> {
        let mut t = self.lock();
        t.check_online()?;
        let before_len = t.sessions.len();
        t.sessions.retain(|_, s| {
            let dead = !s.is_active || s.expires_at < before;
            !(dead && s.last_activity_at < before)
        });
        Ok((before_len - t.sessions.len()) as u64)
    }

    async fn list_audit(&self, task_id: DbId) -> StoreResult<Vec<TaskAuditEntry>> {
        let t = self.lock();
        t.check_online()?;
        Ok(t.audit
            .iter()
            .filter(|e| e.task_id == task_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AvailabilityStore for MemoryStore {
    async fn write_availability(
        &self,
        worker_id: DbId,
        expected: Availability,
        next: Availability,
        now: Timestamp,
    ) -> StoreResult<Option<Worker>> {
        let mut t = self.lock();
        t.check_online()?;
        match t.workers.get_mut(&worker_id) {
            Some(worker) if worker.availability == expected => {
                worker.availability = next;
                worker.availability_changed_at = now;
                worker.updated_at = now;
                Ok(Some(worker.clone()))
            }
            _ => Ok(None),
        }
    }
}
