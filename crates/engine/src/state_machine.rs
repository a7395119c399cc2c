//! Task transitions.
//!
//! Each transition reads the task, checks the caller's relationship to it,
//! asks [`next_status`] whether the move is legal, builds the next row with
//! [`apply`] and commits it with a version/status compare-and-swap. A
//! commit that finds the row changed is reported to the caller, never
//! retried here.

use std::sync::Arc;

use dispatch_core::error::CoreError;
use dispatch_core::events::{
    EVENT_TASK_ACCEPTED, EVENT_TASK_CANCELLED, EVENT_TASK_COMPLETED, EVENT_TASK_CREATED,
    EVENT_TASK_OVERTIME, EVENT_TASK_PAUSED, EVENT_TASK_QUEUED, EVENT_TASK_RESUMED,
    EVENT_TASK_STARTED, REASON_TASK_TRANSITION,
};
use dispatch_core::overtime::is_overdue;
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{Availability, TaskStatus};
use dispatch_core::task_lifecycle::{next_status, validate_new_task, NewTaskSpec, TaskAction};
use dispatch_core::types::{DbId, Timestamp};
use dispatch_db::models::audit::{NewAuditEntry, TaskAuditEntry};
use dispatch_db::models::task::{NewTask, Task, TaskFilter, TaskListQuery};
use dispatch_db::store::UQ_ACTIVE_WORKER;
use dispatch_db::TaskCommit;
use serde_json::json;

use crate::availability::AvailabilityManager;
use crate::error::{EngineError, EngineResult};
use crate::extension::ExtensionNegotiator;
use crate::notify;
use crate::EngineContext;

pub struct TaskStateMachine {
    ctx: EngineContext,
    availability: Arc<AvailabilityManager>,
    extensions: Arc<ExtensionNegotiator>,
}

impl TaskStateMachine {
    pub fn new(
        ctx: EngineContext,
        availability: Arc<AvailabilityManager>,
        extensions: Arc<ExtensionNegotiator>,
    ) -> Self {
        Self {
            ctx,
            availability,
            extensions,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Fetch a task the caller is allowed to see.
    pub async fn get(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_visible(actor, &task)?;
        Ok(task)
    }

    /// List tasks visible to the caller. Dispatchers see their own tasks,
    /// workers see open tasks plus the ones they hold or held.
    pub async fn list(&self, actor: &Actor, query: &TaskListQuery) -> EngineResult<Vec<Task>> {
        let mut filter = TaskFilter {
            statuses: query.status.into_iter().collect(),
            limit: query.limit,
            offset: query.offset,
            ..Default::default()
        };
        match actor.role {
            Role::Administrator => {}
            Role::Dispatcher => filter.dispatcher_id = Some(actor.user_id),
            Role::Worker => {
                filter.worker_id = Some(actor.user_id);
                filter.include_open = true;
            }
        }
        Ok(self.ctx.store.list_tasks(&filter).await?)
    }

    pub async fn audit_history(&self, actor: &Actor, task_id: DbId) -> EngineResult<Vec<TaskAuditEntry>> {
        let task = self.load(task_id).await?;
        ensure_visible(actor, &task)?;
        Ok(self.ctx.store.list_audit(task_id).await?)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Create a `pending` task owned by the calling dispatcher.
    pub async fn create(&self, actor: &Actor, spec: &NewTaskSpec) -> EngineResult<Task> {
        validate_new_task(spec, self.ctx.config.task_max_minutes)?;
        let now = self.ctx.now();
        let input = NewTask {
            title: spec.title.trim().to_string(),
            notes: spec.notes.clone(),
            dispatcher_id: actor.user_id,
            allotted_minutes: spec.allotted_minutes,
        };
        let audit = NewAuditEntry {
            // Filled in by the store once the row exists.
            task_id: 0,
            actor_id: Some(actor.user_id),
            action: "create".to_string(),
            details: json!({ "allotted_minutes": input.allotted_minutes }),
        };
        let task = self.ctx.store.insert_task(&input, &audit, now).await?;

        tracing::info!(task_id = task.id, dispatcher_id = actor.user_id, "Task created");
        self.ctx
            .publish(notify::task_event(EVENT_TASK_CREATED, &task, None, actor, now));
        Ok(task)
    }

    /// Take a `pending` task. The calling worker must be idle; of two
    /// workers racing for one task exactly one wins and the other gets
    /// `AlreadyTaken`.
    pub async fn accept(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        next_status(task.status, TaskAction::Accept).map_err(|e| {
            if task.status.is_active() {
                taken(task_id)
            } else {
                EngineError::Core(e)
            }
        })?;

        let evaluation = self.availability.evaluate(actor.user_id).await?;
        if evaluation.expected != Availability::Idle {
            return Err(EngineError::conflict(format!(
                "Worker {} is {} and cannot accept a task",
                actor.user_id, evaluation.expected
            )));
        }

        self.transition(actor, task, TaskAction::Accept).await
    }

    pub async fn queue(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_holder_or_admin(actor, &task)?;
        self.transition(actor, task, TaskAction::Queue).await
    }

    pub async fn start(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_holder_or_admin(actor, &task)?;
        self.transition(actor, task, TaskAction::Start).await
    }

    pub async fn pause(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_holder_or_owner(actor, &task)?;
        self.transition(actor, task, TaskAction::Pause).await
    }

    pub async fn resume(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_holder_or_owner(actor, &task)?;
        self.transition(actor, task, TaskAction::Resume).await
    }

    pub async fn complete(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_holder_or_owner(actor, &task)?;
        self.transition(actor, task, TaskAction::Complete).await
    }

    pub async fn cancel(&self, actor: &Actor, task_id: DbId) -> EngineResult<Task> {
        let task = self.load(task_id).await?;
        ensure_owner(actor, &task)?;
        self.transition(actor, task, TaskAction::Cancel).await
    }

    /// System transition for an overdue task.
    ///
    /// Returns `None` without writing when the task is no longer running,
    /// is not yet overdue, or moved on since `task` was read, so repeated
    /// scans are no-ops.
    pub async fn mark_overtime(&self, task: &Task) -> EngineResult<Option<Task>> {
        let now = self.ctx.now();
        if !TaskStatus::TIMED.contains(&task.status)
            || !is_overdue(&task.clock(), task.allotted_minutes, now, self.ctx.config.pause_policy)
        {
            return Ok(None);
        }
        match self.transition(&Actor::system(), task.clone(), TaskAction::MarkOvertime).await {
            Ok(updated) => Ok(Some(updated)),
            Err(EngineError::Core(CoreError::Conflict(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, task_id: DbId) -> EngineResult<Task> {
        self.ctx
            .store
            .find_task(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Task", task_id))
    }

    async fn transition(&self, actor: &Actor, task: Task, action: TaskAction) -> EngineResult<Task> {
        let to = next_status(task.status, action)?;
        let now = self.ctx.now();
        let next = apply(&task, action, actor, now);
        let audit = NewAuditEntry {
            task_id: task.id,
            actor_id: (!actor.is_system()).then_some(actor.user_id),
            action: action.as_str().to_string(),
            details: json!({
                "from": task.status,
                "to": to,
                "worker_id": next.holder(),
            }),
        };
        let commit = TaskCommit {
            expected: &task,
            next: &next,
            clear_attention: to.is_terminal(),
            audit: &audit,
        };

        let committed = match self.ctx.store.commit_task(&commit).await {
            Ok(Some(committed)) => committed,
            Ok(None) => {
                tracing::debug!(task_id = task.id, action = action.as_str(), "Transition lost a race");
                return Err(match action {
                    TaskAction::Accept => taken(task.id),
                    _ => EngineError::conflict(format!(
                        "Task {} was modified concurrently; re-read and retry",
                        task.id
                    )),
                });
            }
            Err(e) if e.is_unique_violation(UQ_ACTIVE_WORKER) => {
                return Err(EngineError::conflict(format!(
                    "Worker {} already holds an active task",
                    actor.user_id
                )));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            task_id = committed.id,
            from = %task.status,
            to = %committed.status,
            actor_id = actor.user_id,
            "Task transitioned"
        );

        self.after_commit(actor, &task, &committed, action, now).await;
        Ok(committed)
    }

    /// Follow-up work for a committed transition. Failures here are logged
    /// and left for the reconciler: the transition itself already stands.
    async fn after_commit(
        &self,
        actor: &Actor,
        before: &Task,
        committed: &Task,
        action: TaskAction,
        now: Timestamp,
    ) {
        let worker = match action {
            TaskAction::Accept => committed.worker_id,
            _ if action.releases_worker() => before.worker_id,
            _ => None,
        };
        if let Some(worker_id) = worker {
            if let Err(e) = self.availability.recompute(worker_id, REASON_TASK_TRANSITION).await {
                tracing::warn!(worker_id, task_id = committed.id, error = %e, "Availability recompute failed");
            }
        }

        if committed.status.is_terminal() {
            if let Err(e) = self.extensions.reject_pending_for_task(committed).await {
                tracing::warn!(task_id = committed.id, error = %e, "Auto-reject of pending extension failed");
            }
        }

        self.ctx.publish(notify::task_event(
            event_name(action),
            committed,
            Some(before.status),
            actor,
            now,
        ));
    }
}

/// Build the row a transition commits. Pure; `action` is assumed legal
/// from `task.status`.
pub fn apply(task: &Task, action: TaskAction, actor: &Actor, now: Timestamp) -> Task {
    let mut next = task.clone();
    if let Ok(to) = next_status(task.status, action) {
        next.status = to;
    }
    next.updated_at = now;

    match action {
        TaskAction::Accept => {
            next.worker_id = Some(actor.user_id);
            next.released_worker_id = None;
            next.accepted_at = Some(now);
        }
        TaskAction::Queue => {}
        TaskAction::Start => {
            next.started_at = Some(task.started_at.unwrap_or(now));
        }
        TaskAction::Pause => {
            next.paused_at = Some(now);
        }
        TaskAction::Resume => end_pause(&mut next, now),
        TaskAction::MarkOvertime => {
            next.overtime_at = Some(now);
            next.pre_overtime_status_id = Some(task.status.id());
        }
        TaskAction::Complete | TaskAction::Cancel => {
            end_pause(&mut next, now);
            next.released_worker_id = task.worker_id;
            next.worker_id = None;
            if action == TaskAction::Complete {
                next.completed_at = Some(now);
            } else {
                next.cancelled_at = Some(now);
            }
        }
    }
    next
}

/// Fold the current pause, if any, into `paused_secs`.
fn end_pause(task: &mut Task, now: Timestamp) {
    if let Some(paused_at) = task.paused_at.take() {
        task.paused_secs += (now - paused_at).num_seconds().max(0);
    }
}

fn event_name(action: TaskAction) -> &'static str {
    match action {
        TaskAction::Accept => EVENT_TASK_ACCEPTED,
        TaskAction::Queue => EVENT_TASK_QUEUED,
        TaskAction::Start => EVENT_TASK_STARTED,
        TaskAction::Pause => EVENT_TASK_PAUSED,
        TaskAction::Resume => EVENT_TASK_RESUMED,
        TaskAction::Complete => EVENT_TASK_COMPLETED,
        TaskAction::Cancel => EVENT_TASK_CANCELLED,
        TaskAction::MarkOvertime => EVENT_TASK_OVERTIME,
    }
}

fn taken(task_id: DbId) -> EngineError {
    EngineError::Core(CoreError::AlreadyTaken(format!(
        "Task {task_id} was accepted by another worker"
    )))
}

// ---------------------------------------------------------------------------
// Ownership rules
// ---------------------------------------------------------------------------

fn is_holder(actor: &Actor, task: &Task) -> bool {
    task.worker_id == Some(actor.user_id)
}

fn is_owner(actor: &Actor, task: &Task) -> bool {
    actor.role == Role::Dispatcher && task.dispatcher_id == actor.user_id
}

/// Admins see everything, dispatchers their own tasks, workers open tasks
/// and tasks they hold or held.
pub fn ensure_visible(actor: &Actor, task: &Task) -> EngineResult<()> {
    let visible = match actor.role {
        Role::Administrator => true,
        Role::Dispatcher => task.dispatcher_id == actor.user_id,
        Role::Worker => task.status == TaskStatus::Pending || task.holder() == Some(actor.user_id),
    };
    if visible {
        Ok(())
    } else {
        Err(EngineError::forbidden(format!("Task {} is not visible to you", task.id)))
    }
}

fn ensure_holder_or_admin(actor: &Actor, task: &Task) -> EngineResult<()> {
    if actor.role == Role::Administrator || is_holder(actor, task) {
        return Ok(());
    }
    Err(EngineError::forbidden("Only the assigned worker may do this"))
}

fn ensure_holder_or_owner(actor: &Actor, task: &Task) -> EngineResult<()> {
    if actor.role == Role::Administrator || is_holder(actor, task) || is_owner(actor, task) {
        return Ok(());
    }
    Err(EngineError::forbidden(
        "Only the assigned worker or the owning dispatcher may do this",
    ))
}

fn ensure_owner(actor: &Actor, task: &Task) -> EngineResult<()> {
    if actor.role == Role::Administrator || is_owner(actor, task) {
        return Ok(());
    }
    Err(EngineError::forbidden("Only the owning dispatcher may do this"))
}
