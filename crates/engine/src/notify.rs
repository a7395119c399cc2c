//! Event construction. Addressing rules live here so every component
//! routes the same way.

use dispatch_core::events::{
    EVENT_TASK_ACCEPTED, EVENT_TASK_ATTENTION, EVENT_TASK_CREATED, EVENT_WORKER_STATUS_CHANGED,
};
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{Availability, TaskStatus};
use dispatch_core::types::Timestamp;
use dispatch_db::models::extension_request::ExtensionRequest;
use dispatch_db::models::task::Task;
use dispatch_db::models::worker::Worker;
use dispatch_events::DomainEvent;
use serde_json::json;

fn with_actor(event: DomainEvent, actor: &Actor) -> DomainEvent {
    if actor.is_system() {
        event
    } else {
        event.with_actor(actor.user_id)
    }
}

/// A task event goes to the owning dispatcher, the holding worker and
/// administrators. Changes to the open pool (new task, taken, pending task
/// cancelled) also go to every worker.
pub(crate) fn task_event(
    name: &str,
    task: &Task,
    previous_status: Option<TaskStatus>,
    actor: &Actor,
    now: Timestamp,
) -> DomainEvent {
    let mut event = DomainEvent::new(name)
        .at(now)
        .to_user(task.dispatcher_id)
        .to_role(Role::Administrator)
        .with_payload(json!({ "task": task }));
    if let Some(worker_id) = task.holder() {
        event = event.to_user(worker_id);
    }
    let touches_pool = name == EVENT_TASK_CREATED
        || name == EVENT_TASK_ACCEPTED
        || previous_status == Some(TaskStatus::Pending);
    if touches_pool {
        event = event.to_role(Role::Worker);
    }
    with_actor(event, actor)
}

pub(crate) fn worker_status_event(
    worker: &Worker,
    previous: Availability,
    reason: &str,
    now: Timestamp,
) -> DomainEvent {
    DomainEvent::new(EVENT_WORKER_STATUS_CHANGED)
        .at(now)
        .to_user(worker.id)
        .to_role(Role::Dispatcher)
        .to_role(Role::Administrator)
        .with_payload(json!({
            "worker_id": worker.id,
            "status": worker.availability,
            "previous": previous,
            "reason": reason,
        }))
}

/// Extension events go to the task's dispatcher, the requesting worker and
/// administrators.
pub(crate) fn extension_event(
    name: &str,
    request: &ExtensionRequest,
    task: &Task,
    actor: &Actor,
    now: Timestamp,
) -> DomainEvent {
    let event = DomainEvent::new(name)
        .at(now)
        .to_user(task.dispatcher_id)
        .to_user(request.worker_id)
        .to_role(Role::Administrator)
        .with_payload(json!({ "request": request }));
    with_actor(event, actor)
}

pub(crate) fn attention_event(task: &Task, now: Timestamp) -> DomainEvent {
    DomainEvent::new(EVENT_TASK_ATTENTION)
        .at(now)
        .to_user(task.dispatcher_id)
        .to_role(Role::Administrator)
        .with_payload(json!({
            "task": task,
            "reason": task.attention_reason,
        }))
}
