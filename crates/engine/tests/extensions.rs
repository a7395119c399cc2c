//! Extension requests, review and direct extension.

mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use common::Harness;
use dispatch_core::error::CoreError;
use dispatch_core::extension::ReviewDecision;
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{ExtensionStatus, TaskStatus};
use dispatch_db::models::extension_request::ExtensionListQuery;
use dispatch_db::Store;
use dispatch_engine::EngineError;

// ---------------------------------------------------------------------------
// Test: request preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn request_outside_bounds_is_rejected() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;

    for minutes in [0, 4, 481] {
        let err = h
            .engine
            .extensions
            .request(&worker, task.id, minutes, None)
            .await
            .unwrap_err();
        assert_matches!(err, EngineError::Core(CoreError::Validation(_)));
    }
}

#[tokio::test]
async fn request_needs_a_running_task() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(60).await;
    h.engine.tasks.accept(&worker, task.id).await.unwrap();

    let err = h
        .engine
        .extensions
        .request(&worker, task.id, 15, None)
        .await
        .unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
}

#[tokio::test]
async fn only_the_assigned_worker_may_request() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let other = h.online_worker(21).await;
    let task = h.running_task(&worker, 60).await;

    let err = h
        .engine
        .extensions
        .request(&other, task.id, 15, None)
        .await
        .unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)));
}

#[tokio::test]
async fn second_pending_request_conflicts() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.engine
        .extensions
        .request(&worker, task.id, 15, None)
        .await
        .unwrap();

    let err = h
        .engine
        .extensions
        .request(&worker, task.id, 20, None)
        .await
        .unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::Conflict(_)));
}

// ---------------------------------------------------------------------------
// Test: review
// ---------------------------------------------------------------------------

#[tokio::test]
async fn approval_adds_minutes_exactly_once() {
    let mut h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 30, Some("Customer asked for more".to_string()))
        .await
        .unwrap();
    h.drain();

    let reviewed = h
        .engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap();

    assert_eq!(reviewed.status, ExtensionStatus::Approved);
    assert_eq!(reviewed.reviewer_id, Some(common::DISPATCHER_ID));
    assert_eq!(h.task_row(task.id).await.allotted_minutes, 90);
    let names = h.drain_names();
    assert!(names.contains(&"extension_reviewed".to_string()));
    assert!(names.contains(&"task_extended".to_string()));

    let err = h
        .engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
    assert_eq!(h.task_row(task.id).await.allotted_minutes, 90);
}

#[tokio::test]
async fn rejection_leaves_task_alone() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 30, None)
        .await
        .unwrap();

    let reviewed = h
        .engine
        .extensions
        .review(
            &h.dispatcher(),
            request.id,
            ReviewDecision::Rejected,
            Some("Wrap it up".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(reviewed.status, ExtensionStatus::Rejected);
    assert_eq!(reviewed.review_reason.as_deref(), Some("Wrap it up"));
    let stored = h.task_row(task.id).await;
    assert_eq!(stored.allotted_minutes, 60);
    assert_eq!(stored.version, task.version);
}

#[tokio::test]
async fn approval_lifts_overtime_back_to_prior_status() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.engine.tasks.pause(&worker, task.id).await.unwrap();
    h.advance(Duration::minutes(61));
    h.engine.overtime.scan_once().await.unwrap();
    assert_eq!(h.task_row(task.id).await.status, TaskStatus::Overtime);

    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 30, None)
        .await
        .unwrap();
    h.engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap();

    let stored = h.task_row(task.id).await;
    assert_eq!(stored.allotted_minutes, 90);
    assert_eq!(stored.status, TaskStatus::Paused);
    assert_eq!(stored.worker_id, Some(20));
}

#[tokio::test]
async fn short_approval_keeps_overtime() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.advance(Duration::minutes(90));
    h.engine.overtime.scan_once().await.unwrap();

    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 10, None)
        .await
        .unwrap();
    h.engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap();

    let stored = h.task_row(task.id).await;
    assert_eq!(stored.allotted_minutes, 70);
    assert_eq!(stored.status, TaskStatus::Overtime);
}

#[tokio::test]
async fn foreign_dispatcher_cannot_review() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 30, None)
        .await
        .unwrap();

    let err = h
        .engine
        .extensions
        .review(
            &Actor::new(101, Role::Dispatcher),
            request.id,
            ReviewDecision::Approved,
            None,
        )
        .await
        .unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)));
}

// ---------------------------------------------------------------------------
// Test: direct extension
// ---------------------------------------------------------------------------

#[tokio::test]
async fn extend_direct_adds_minutes_and_audits() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;

    let updated = h
        .engine
        .extensions
        .extend_direct(&h.dispatcher(), task.id, 20, Some("Late delivery".to_string()))
        .await
        .unwrap();

    assert_eq!(updated.allotted_minutes, 80);
    let history = h.store.list_audit(task.id).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, "extend_direct");
    assert_eq!(last.details["from_minutes"], 60);
    assert_eq!(last.details["to_minutes"], 80);
    assert!(h
        .store
        .find_pending_extension(task.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn extend_direct_respects_bounds_and_terminal_state() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;

    let err = h
        .engine
        .extensions
        .extend_direct(&h.dispatcher(), task.id, 500, None)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Validation(_)));

    h.engine.tasks.complete(&worker, task.id).await.unwrap();
    let err = h
        .engine
        .extensions
        .extend_direct(&h.dispatcher(), task.id, 30, None)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// Test: listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_list_is_scoped_to_dispatcher() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.engine
        .extensions
        .request(&worker, task.id, 30, None)
        .await
        .unwrap();
    let query = ExtensionListQuery {
        status: Some(ExtensionStatus::Pending),
        task_id: None,
    };

    let mine = h.engine.extensions.list(&h.dispatcher(), &query).await.unwrap();
    let theirs = h
        .engine
        .extensions
        .list(&Actor::new(101, Role::Dispatcher), &query)
        .await
        .unwrap();

    assert_eq!(mine.len(), 1);
    assert!(theirs.is_empty());
}
