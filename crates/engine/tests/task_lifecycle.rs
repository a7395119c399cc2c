//! Task transitions through the assembled engine.

mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use common::{Harness, DISPATCHER_ID};
use dispatch_core::error::CoreError;
use dispatch_core::extension::{ReviewDecision, AUTO_REJECT_REASON};
use dispatch_core::roles::{Actor, Role};
use dispatch_core::status::{Availability, ExtensionStatus, TaskStatus};
use dispatch_core::task_lifecycle::NewTaskSpec;
use dispatch_db::models::task::TaskListQuery;
use dispatch_db::{Store, StoreError};
use dispatch_engine::EngineError;

// ---------------------------------------------------------------------------
// Test: create validates and starts pending
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_starts_pending_and_notifies_workers() {
    let mut h = Harness::new();
    let task = h.task(30).await;

    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.worker_id, None);
    assert_eq!(task.allotted_minutes, 30);

    let events = h.drain();
    let created = events.iter().find(|e| e.event_name == "task_created").unwrap();
    assert!(created.addresses(DISPATCHER_ID, Role::Dispatcher));
    assert!(created.addresses(999, Role::Worker));
    assert_eq!(created.payload["task"]["id"], task.id);
}

#[tokio::test]
async fn create_rejects_bad_duration() {
    let h = Harness::new();
    let spec = NewTaskSpec {
        title: "Fix sign".to_string(),
        notes: None,
        allotted_minutes: 0,
    };
    let err = h.engine.tasks.create(&h.dispatcher(), &spec).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Validation(_)));
}

#[tokio::test]
async fn create_that_cannot_be_audited_leaves_nothing_behind() {
    let mut h = Harness::new();
    h.store.fail_audit_writes(true);
    let spec = NewTaskSpec {
        title: "Fix sign".to_string(),
        notes: None,
        allotted_minutes: 30,
    };

    let err = h.engine.tasks.create(&h.dispatcher(), &spec).await.unwrap_err();

    assert_matches!(err, EngineError::Store(StoreError::Unavailable(_)));
    assert!(h.store.list_tasks_in(TaskStatus::ALL).await.unwrap().is_empty());
    assert!(h.drain().is_empty());

    h.store.fail_audit_writes(false);
    let task = h.engine.tasks.create(&h.dispatcher(), &spec).await.unwrap();
    let history = h.store.list_audit(task.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, "create");
    assert_eq!(history[0].details["allotted_minutes"], 30);
    assert_eq!(h.store.list_tasks_in(TaskStatus::ALL).await.unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Test: accept assigns and flips availability
// ---------------------------------------------------------------------------

#[tokio::test]
async fn accept_assigns_worker_and_marks_busy() {
    let mut h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;
    h.drain();

    let accepted = h.engine.tasks.accept(&worker, task.id).await.unwrap();

    assert_eq!(accepted.status, TaskStatus::Accepted);
    assert_eq!(accepted.worker_id, Some(20));
    assert_eq!(h.availability(20).await, Availability::Busy);
    let names = h.drain_names();
    assert!(names.contains(&"task_accepted".to_string()));
    assert!(names.contains(&"worker_status_changed".to_string()));
    h.assert_invariants().await;
}

#[tokio::test]
async fn busy_worker_cannot_accept_another_task() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    h.running_task(&worker, 30).await;
    let other = h.task(30).await;

    let err = h.engine.tasks.accept(&worker, other.id).await.unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::Conflict(_)));
    assert_eq!(h.task_row(other.id).await.status, TaskStatus::Pending);
}

#[tokio::test]
async fn offline_worker_cannot_accept() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    h.engine.sessions.close_sessions(20).await.unwrap();
    let task = h.task(30).await;

    let err = h.engine.tasks.accept(&worker, task.id).await.unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::Conflict(_)));
}

#[tokio::test]
async fn accepting_a_taken_task_reports_already_taken() {
    let h = Harness::new();
    let first = h.online_worker(20).await;
    let second = h.online_worker(21).await;
    let task = h.task(30).await;
    h.engine.tasks.accept(&first, task.id).await.unwrap();

    let err = h.engine.tasks.accept(&second, task.id).await.unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::AlreadyTaken(_)));
}

#[tokio::test]
async fn accepting_a_finished_task_is_invalid_state() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;
    h.engine.tasks.cancel(&h.dispatcher(), task.id).await.unwrap();

    let err = h.engine.tasks.accept(&worker, task.id).await.unwrap_err();

    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
}

// ---------------------------------------------------------------------------
// Test: concurrent accepts
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_accept_has_exactly_one_winner() {
    let (h, store) = Harness::racing();
    let a = h.online_worker(20).await;
    let b = h.online_worker(21).await;
    let task = h.task(30).await;

    let (ra, rb) = tokio::join!(
        h.engine.tasks.accept(&a, task.id),
        h.engine.tasks.accept(&b, task.id)
    );

    let wins = [ra.is_ok(), rb.is_ok()].iter().filter(|ok| **ok).count();
    assert_eq!(wins, 1);
    let loser = if ra.is_ok() { rb } else { ra };
    assert_matches!(loser, Err(EngineError::Core(CoreError::AlreadyTaken(_))));
    // Both read `pending`; the loser's conditional update found the row moved.
    assert_eq!(store.lost_swaps(), 1);

    let stored = h.task_row(task.id).await;
    assert_eq!(stored.status, TaskStatus::Accepted);
    let winner = stored.worker_id.unwrap();
    assert_eq!(h.availability(winner).await, Availability::Busy);
    let other = if winner == 20 { 21 } else { 20 };
    assert_eq!(h.availability(other).await, Availability::Idle);
    h.assert_invariants().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn one_worker_racing_for_two_tasks_gets_one() {
    let (h, store) = Harness::racing();
    let worker = h.online_worker(20).await;
    let t1 = h.task(30).await;
    let t2 = h.task(30).await;

    let (r1, r2) = tokio::join!(
        h.engine.tasks.accept(&worker, t1.id),
        h.engine.tasks.accept(&worker, t2.id)
    );

    assert_eq!([r1.is_ok(), r2.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if r1.is_ok() { r2 } else { r1 };
    assert_matches!(loser, Err(EngineError::Core(CoreError::Conflict(_))));
    // Both saw the worker idle; the active-worker index refused the second.
    assert_eq!(store.worker_clashes(), 1);
    assert_eq!(store.lost_swaps(), 0);
    assert_eq!(h.store.list_active_tasks_for_worker(20).await.unwrap().len(), 1);
    h.assert_invariants().await;
}

// ---------------------------------------------------------------------------
// Test: pause accounting and source-state checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pause_and_resume_accumulate_paused_time() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;

    h.engine.tasks.pause(&worker, task.id).await.unwrap();
    h.advance(Duration::minutes(7));
    let resumed = h.engine.tasks.resume(&worker, task.id).await.unwrap();

    assert_eq!(resumed.status, TaskStatus::InProgress);
    assert_eq!(resumed.paused_at, None);
    assert_eq!(resumed.paused_secs, 7 * 60);
}

#[tokio::test]
async fn pause_from_wrong_state_is_invalid() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;
    h.engine.tasks.accept(&worker, task.id).await.unwrap();

    let err = h.engine.tasks.pause(&worker, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));

    let err = h.engine.tasks.complete(&worker, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
}

#[tokio::test]
async fn queue_then_start() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;
    h.engine.tasks.accept(&worker, task.id).await.unwrap();

    let queued = h.engine.tasks.queue(&worker, task.id).await.unwrap();
    assert_eq!(queued.status, TaskStatus::Queued);
    assert_eq!(h.availability(20).await, Availability::Busy);

    let started = h.engine.tasks.start(&worker, task.id).await.unwrap();
    assert_eq!(started.status, TaskStatus::InProgress);
    assert!(started.started_at.is_some());
    h.assert_invariants().await;
}

// ---------------------------------------------------------------------------
// Test: ownership
// ---------------------------------------------------------------------------

#[tokio::test]
async fn only_the_assigned_worker_may_start() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let stranger = h.online_worker(21).await;
    let task = h.task(30).await;
    h.engine.tasks.accept(&worker, task.id).await.unwrap();

    let err = h.engine.tasks.start(&stranger, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)));
}

#[tokio::test]
async fn other_dispatchers_cannot_cancel_or_see() {
    let h = Harness::new();
    let task = h.task(30).await;
    let other = Actor::new(101, Role::Dispatcher);

    let err = h.engine.tasks.cancel(&other, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)));

    let err = h.engine.tasks.get(&other, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)));

    assert!(h.engine.tasks.get(&h.admin(), task.id).await.is_ok());
}

#[tokio::test]
async fn dispatcher_may_complete_on_behalf_of_worker() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 30).await;

    let done = h.engine.tasks.complete(&h.dispatcher(), task.id).await.unwrap();

    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(h.availability(20).await, Availability::Idle);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let err = h.engine.tasks.accept(&worker, 4242).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::NotFound { entity: "Task", id: 4242 }));
}

// ---------------------------------------------------------------------------
// Test: listing is scoped by role
// ---------------------------------------------------------------------------

#[tokio::test]
async fn workers_list_open_and_own_tasks() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let other = h.online_worker(21).await;
    let mine = h.running_task(&worker, 30).await;
    let theirs = h.running_task(&other, 30).await;
    let open = h.task(30).await;

    let listed = h
        .engine
        .tasks
        .list(&worker, &TaskListQuery::default())
        .await
        .unwrap();
    let ids: Vec<_> = listed.iter().map(|t| t.id).collect();

    assert!(ids.contains(&mine.id));
    assert!(ids.contains(&open.id));
    assert!(!ids.contains(&theirs.id));
}

// ---------------------------------------------------------------------------
// Test: terminal transitions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_releases_worker_and_keeps_history() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 30).await;

    let cancelled = h.engine.tasks.cancel(&h.dispatcher(), task.id).await.unwrap();

    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.worker_id, None);
    assert_eq!(cancelled.released_worker_id, Some(20));
    assert_eq!(h.availability(20).await, Availability::Idle);
    assert!(h.engine.tasks.get(&worker, task.id).await.is_ok());

    let err = h.engine.tasks.resume(&worker, task.id).await.unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::Forbidden(_)) | EngineError::Core(CoreError::InvalidState(_)));
    h.assert_invariants().await;
}

#[tokio::test]
async fn completing_auto_rejects_pending_extension() {
    let mut h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 30).await;
    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 15, Some("Parts late".to_string()))
        .await
        .unwrap();
    h.drain();

    h.engine.tasks.complete(&worker, task.id).await.unwrap();

    let stored = h.store.find_extension_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ExtensionStatus::Rejected);
    assert_eq!(stored.reviewer_id, None);
    assert_eq!(stored.review_reason.as_deref(), Some(AUTO_REJECT_REASON));
    assert!(h.drain_names().contains(&"extension_reviewed".to_string()));

    let err = h
        .engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::Core(CoreError::InvalidState(_)));
}

#[tokio::test]
async fn every_transition_is_audited() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 30).await;
    h.engine.tasks.complete(&worker, task.id).await.unwrap();

    let history = h
        .engine
        .tasks
        .audit_history(&h.dispatcher(), task.id)
        .await
        .unwrap();
    let actions: Vec<_> = history.iter().map(|e| e.action.as_str()).collect();

    assert_eq!(actions, vec!["create", "accept", "start", "complete"]);
    assert_eq!(history[3].details["from"], "in_progress");
    assert_eq!(history[3].details["to"], "completed");
    assert_eq!(history[3].actor_id, Some(20));
}

// ---------------------------------------------------------------------------
// Test: store failures surface and leave no partial write
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_failure_is_reported_and_nothing_commits() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;
    h.store.fail_commits_for(task.id);

    let err = h.engine.tasks.accept(&worker, task.id).await.unwrap_err();

    assert_matches!(err, EngineError::Store(_));
    assert_eq!(h.task_row(task.id).await.status, TaskStatus::Pending);
    assert_eq!(h.availability(20).await, Availability::Idle);
}

// ---------------------------------------------------------------------------
// Test: round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_accept_start_extend_complete() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(30).await;

    h.engine.tasks.accept(&worker, task.id).await.unwrap();
    h.engine.tasks.start(&worker, task.id).await.unwrap();
    let request = h
        .engine
        .extensions
        .request(&worker, task.id, 15, None)
        .await
        .unwrap();
    h.engine
        .extensions
        .review(&h.dispatcher(), request.id, ReviewDecision::Approved, None)
        .await
        .unwrap();
    let done = h.engine.tasks.complete(&worker, task.id).await.unwrap();

    assert_eq!(done.allotted_minutes, 45);
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(h.availability(20).await, Availability::Idle);
    h.assert_invariants().await;
}

#[tokio::test]
async fn invariants_hold_across_mixed_sequences() {
    let h = Harness::new();
    let workers = [
        h.online_worker(20).await,
        h.online_worker(21).await,
        h.online_worker(22).await,
    ];

    for round in 0..4 {
        for (i, worker) in workers.iter().enumerate() {
            let task = h.task(30).await;
            h.engine.tasks.accept(worker, task.id).await.unwrap();
            h.assert_invariants().await;
            if (round + i) % 3 == 0 {
                h.engine.tasks.cancel(&h.dispatcher(), task.id).await.unwrap();
            } else {
                h.engine.tasks.start(worker, task.id).await.unwrap();
                if i % 2 == 0 {
                    h.engine.tasks.pause(worker, task.id).await.unwrap();
                }
                h.engine.tasks.complete(worker, task.id).await.unwrap();
            }
            h.assert_invariants().await;
        }
    }
    for worker in &workers {
        assert_eq!(h.availability(worker.user_id).await, Availability::Idle);
    }
}
