//! Extension requests, review and direct extension.

use dispatch_core::error::CoreError;
use dispatch_core::events::{EVENT_EXTENSION_REQUESTED, EVENT_EXTENSION_REVIEWED, EVENT_TASK_EXTENDED};
use dispatch_core::extension::{validate_reason, ReviewDecision, AUTO_REJECT_REASON};
use dispatch_core::overtime::{is_overdue, PausePolicy};
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{ExtensionStatus, TaskStatus};
use dispatch_core::types::{DbId, Timestamp};
use dispatch_db::models::audit::{NewAuditEntry, ACTION_EXTEND_DIRECT, ACTION_EXTENSION_APPROVED};
use dispatch_db::models::extension_request::{
    ExtensionFilter, ExtensionListQuery, ExtensionRequest, ExtensionReview, NewExtensionRequest,
};
use dispatch_db::models::task::Task;
use dispatch_db::store::UQ_PENDING_EXTENSION;
use dispatch_db::{ReviewOutcome, TaskCommit};
use serde_json::json;

use crate::error::{EngineError, EngineResult};
use crate::notify;
use crate::EngineContext;

pub struct ExtensionNegotiator {
    ctx: EngineContext,
}

impl ExtensionNegotiator {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// File a pending request on the caller's running task.
    pub async fn request(
        &self,
        actor: &Actor,
        task_id: DbId,
        minutes: i32,
        reason: Option<String>,
    ) -> EngineResult<ExtensionRequest> {
        self.ctx.config.extension_bounds.validate(minutes)?;
        validate_reason(reason.as_deref())?;

        let task = self.load_task(task_id).await?;
        if task.worker_id != Some(actor.user_id) {
            return Err(EngineError::forbidden(
                "Only the assigned worker may request an extension",
            ));
        }
        if !task.status.accepts_extension() {
            return Err(EngineError::invalid_state(format!(
                "Cannot request an extension on a task that is {}",
                task.status
            )));
        }
        if self.ctx.store.find_pending_extension(task_id).await?.is_some() {
            return Err(pending_exists(task_id));
        }

        let now = self.ctx.now();
        let input = NewExtensionRequest {
            task_id,
            worker_id: actor.user_id,
            requested_minutes: minutes,
            reason,
        };
        let request = match self.ctx.store.insert_extension_request(&input, now).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                return Err(EngineError::invalid_state(format!(
                    "Task {task_id} no longer accepts extensions"
                )));
            }
            Err(e) if e.is_unique_violation(UQ_PENDING_EXTENSION) => {
                return Err(pending_exists(task_id));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            request_id = request.id,
            task_id,
            minutes,
            "Extension requested"
        );
        self.ctx.publish(notify::extension_event(
            EVENT_EXTENSION_REQUESTED,
            &request,
            &task,
            actor,
            now,
        ));
        Ok(request)
    }

    /// Approve or reject a pending request.
    ///
    /// Approval adds the requested minutes to the task in the same write
    /// that closes the request. A task in overtime whose new allotment
    /// exceeds its elapsed time returns to the status it held before.
    pub async fn review(
        &self,
        actor: &Actor,
        request_id: DbId,
        decision: ReviewDecision,
        reason: Option<String>,
    ) -> EngineResult<ExtensionRequest> {
        validate_reason(reason.as_deref())?;

        let request = self
            .ctx
            .store
            .find_extension_request(request_id)
            .await?
            .ok_or_else(|| EngineError::not_found("ExtensionRequest", request_id))?;
        let task = self.load_task(request.task_id).await?;
        ensure_reviewer(actor, &task)?;
        if request.status != ExtensionStatus::Pending {
            return Err(not_pending(request_id, request.status));
        }

        let now = self.ctx.now();
        let review = ExtensionReview {
            request_id,
            status: match decision {
                ReviewDecision::Approved => ExtensionStatus::Approved,
                ReviewDecision::Rejected => ExtensionStatus::Rejected,
            },
            reviewer_id: Some(actor.user_id),
            review_reason: reason,
            reviewed_at: now,
        };

        let outcome = match decision {
            ReviewDecision::Rejected => self.ctx.store.review_extension(&review, None).await?,
            ReviewDecision::Approved => {
                if task.status.is_terminal() {
                    return Err(EngineError::invalid_state(format!(
                        "Task {} is {} and cannot be extended",
                        task.id, task.status
                    )));
                }
                let next = extend(&task, request.requested_minutes, now, self.ctx.config.pause_policy);
                let audit = NewAuditEntry {
                    task_id: task.id,
                    actor_id: Some(actor.user_id),
                    action: ACTION_EXTENSION_APPROVED.to_string(),
                    details: extension_details(&task, &next, Some(request_id)),
                };
                let commit = TaskCommit {
                    expected: &task,
                    next: &next,
                    clear_attention: false,
                    audit: &audit,
                };
                self.ctx.store.review_extension(&review, Some(&commit)).await?
            }
        };

        let (reviewed, extended) = match outcome {
            ReviewOutcome::Reviewed { request, task } => (request, task),
            ReviewOutcome::RequestNotPending => {
                let status = self
                    .ctx
                    .store
                    .find_extension_request(request_id)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(request.status);
                return Err(not_pending(request_id, status));
            }
            ReviewOutcome::TaskChanged => {
                return Err(EngineError::conflict(format!(
                    "Task {} changed during review; re-read and retry",
                    task.id
                )));
            }
        };

        tracing::info!(
            request_id,
            task_id = task.id,
            status = %reviewed.status,
            reviewer_id = actor.user_id,
            "Extension reviewed"
        );
        self.ctx.publish(notify::extension_event(
            EVENT_EXTENSION_REVIEWED,
            &reviewed,
            &task,
            actor,
            now,
        ));
        if let Some(updated) = extended {
            self.publish_extended(&task, &updated, actor, now);
        }
        Ok(reviewed)
    }

    /// Dispatcher shortcut: add minutes without a request record.
    pub async fn extend_direct(
        &self,
        actor: &Actor,
        task_id: DbId,
        minutes: i32,
        reason: Option<String>,
    ) -> EngineResult<Task> {
        self.ctx.config.extension_bounds.validate(minutes)?;
        validate_reason(reason.as_deref())?;

        let task = self.load_task(task_id).await?;
        ensure_reviewer(actor, &task)?;
        if task.status.is_terminal() {
            return Err(EngineError::invalid_state(format!(
                "Task {task_id} is {} and cannot be extended",
                task.status
            )));
        }

        let now = self.ctx.now();
        let next = extend(&task, minutes, now, self.ctx.config.pause_policy);
        let mut details = extension_details(&task, &next, None);
        details["reason"] = json!(reason);
        let audit = NewAuditEntry {
            task_id,
            actor_id: Some(actor.user_id),
            action: ACTION_EXTEND_DIRECT.to_string(),
            details,
        };
        let commit = TaskCommit {
            expected: &task,
            next: &next,
            clear_attention: false,
            audit: &audit,
        };

        let updated = self.ctx.store.commit_task(&commit).await?.ok_or_else(|| {
            EngineError::conflict(format!(
                "Task {task_id} was modified concurrently; re-read and retry"
            ))
        })?;

        tracing::info!(
            task_id,
            minutes,
            allotted = updated.allotted_minutes,
            "Task extended directly"
        );
        self.publish_extended(&task, &updated, actor, now);
        Ok(updated)
    }

    /// List requests visible to the caller.
    pub async fn list(
        &self,
        actor: &Actor,
        query: &ExtensionListQuery,
    ) -> EngineResult<Vec<ExtensionRequest>> {
        let mut filter = ExtensionFilter {
            status: query.status,
            task_id: query.task_id,
            ..Default::default()
        };
        match actor.role {
            Role::Administrator => {}
            Role::Dispatcher => filter.dispatcher_id = Some(actor.user_id),
            Role::Worker => filter.worker_id = Some(actor.user_id),
        }
        Ok(self.ctx.store.list_extension_requests(&filter).await?)
    }

    /// Close the pending request on a task that just terminated.
    pub(crate) async fn reject_pending_for_task(&self, task: &Task) -> EngineResult<()> {
        let Some(request) = self.ctx.store.find_pending_extension(task.id).await? else {
            return Ok(());
        };
        let now = self.ctx.now();
        let review = ExtensionReview {
            request_id: request.id,
            status: ExtensionStatus::Rejected,
            reviewer_id: None,
            review_reason: Some(AUTO_REJECT_REASON.to_string()),
            reviewed_at: now,
        };

        if let ReviewOutcome::Reviewed { request, .. } =
            self.ctx.store.review_extension(&review, None).await?
        {
            tracing::info!(request_id = request.id, task_id = task.id, "Extension auto-rejected");
            self.ctx.publish(notify::extension_event(
                EVENT_EXTENSION_REVIEWED,
                &request,
                task,
                &Actor::system(),
                now,
            ));
        }
        Ok(())
    }

    async fn load_task(&self, task_id: DbId) -> EngineResult<Task> {
        self.ctx
            .store
            .find_task(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Task", task_id))
    }

    fn publish_extended(&self, before: &Task, after: &Task, actor: &Actor, now: Timestamp) {
        if before.status != after.status {
            tracing::info!(
                task_id = after.id,
                from = %before.status,
                to = %after.status,
                "Extension lifted task out of overtime"
            );
        }
        self.ctx.publish(notify::task_event(
            EVENT_TASK_EXTENDED,
            after,
            Some(before.status),
            actor,
            now,
        ));
    }
}

/// The task with `minutes` more allotted time, out of overtime if the new
/// allotment is no longer exceeded.
pub fn extend(task: &Task, minutes: i32, now: Timestamp, policy: PausePolicy) -> Task {
    let mut next = task.clone();
    next.allotted_minutes = task.allotted_minutes + minutes;
    next.updated_at = now;

    if task.status == TaskStatus::Overtime
        && !is_overdue(&task.clock(), next.allotted_minutes, now, policy)
    {
        next.status = task.pre_overtime_status().unwrap_or(if task.paused_at.is_some() {
            TaskStatus::Paused
        } else {
            TaskStatus::InProgress
        });
        next.overtime_at = None;
        next.pre_overtime_status_id = None;
    }
    next
}

fn extension_details(before: &Task, after: &Task, request_id: Option<DbId>) -> serde_json::Value {
    let mut details = json!({
        "from_minutes": before.allotted_minutes,
        "to_minutes": after.allotted_minutes,
    });
    if let Some(id) = request_id {
        details["request_id"] = json!(id);
    }
    if before.status != after.status {
        details["from"] = json!(before.status);
        details["to"] = json!(after.status);
    }
    details
}

fn ensure_reviewer(actor: &Actor, task: &Task) -> EngineResult<()> {
    match actor.role {
        Role::Administrator => Ok(()),
        Role::Dispatcher if task.dispatcher_id == actor.user_id => Ok(()),
        _ => Err(EngineError::forbidden(
            "Only the owning dispatcher may extend this task",
        )),
    }
}

fn pending_exists(task_id: DbId) -> EngineError {
    EngineError::conflict(format!(
        "Task {task_id} already has a pending extension request"
    ))
}

fn not_pending(request_id: DbId, status: ExtensionStatus) -> EngineError {
    EngineError::Core(CoreError::InvalidState(format!(
        "Extension request {request_id} is already {status}"
    )))
}
