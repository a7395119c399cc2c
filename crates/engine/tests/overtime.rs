//! Overtime detector passes.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::Harness;
use dispatch_core::overtime::PausePolicy;
use dispatch_core::status::{Availability, TaskStatus};
use dispatch_engine::EngineConfig;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test: overdue task is marked once
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overdue_task_is_marked_and_rescan_is_noop() {
    let mut h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.advance(Duration::minutes(61));
    h.drain();

    let first = h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(first.marked, vec![task.id]);
    assert!(first.failures.is_empty());
    let stored = h.task_row(task.id).await;
    assert_eq!(stored.status, TaskStatus::Overtime);
    assert_eq!(stored.worker_id, Some(20));
    assert_eq!(stored.pre_overtime_status(), Some(TaskStatus::InProgress));
    assert_eq!(h.drain_names(), vec!["task_overtime".to_string()]);

    let second = h.engine.overtime.scan_once().await.unwrap();

    assert!(second.marked.is_empty());
    assert_eq!(second.scanned, 0);
    assert_eq!(h.task_row(task.id).await.version, stored.version);
    assert!(h.drain().is_empty());
}

#[tokio::test]
async fn task_within_allotment_is_untouched() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.advance(Duration::minutes(59));

    let report = h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(report.scanned, 1);
    assert!(report.marked.is_empty());
    assert_eq!(h.task_row(task.id).await.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn accepted_but_unstarted_task_is_not_scanned() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.task(10).await;
    h.engine.tasks.accept(&worker, task.id).await.unwrap();
    h.advance(Duration::hours(3));

    let report = h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(report.scanned, 0);
    assert_eq!(h.task_row(task.id).await.status, TaskStatus::Accepted);
}

#[tokio::test]
async fn overtime_keeps_worker_busy() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 5).await;
    h.advance(Duration::minutes(4));
    h.engine.sessions.touch(20).await.unwrap();
    h.advance(Duration::minutes(2));

    h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(h.task_row(task.id).await.status, TaskStatus::Overtime);
    assert_eq!(h.availability(20).await, Availability::Busy);
}

// ---------------------------------------------------------------------------
// Test: pause policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn excluded_pause_time_delays_overtime() {
    let h = Harness::with_config(EngineConfig {
        pause_policy: PausePolicy::ExcludePaused,
        ..Default::default()
    });
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.advance(Duration::minutes(30));
    h.engine.tasks.pause(&worker, task.id).await.unwrap();
    h.advance(Duration::minutes(40));

    let report = h.engine.overtime.scan_once().await.unwrap();
    assert!(report.marked.is_empty());

    h.engine.tasks.resume(&worker, task.id).await.unwrap();
    h.advance(Duration::minutes(31));

    let report = h.engine.overtime.scan_once().await.unwrap();
    assert_eq!(report.marked, vec![task.id]);
}

#[tokio::test]
async fn included_pause_time_counts() {
    let h = Harness::new();
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 60).await;
    h.engine.tasks.pause(&worker, task.id).await.unwrap();
    h.advance(Duration::minutes(60));

    let report = h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(report.marked, vec![task.id]);
    let stored = h.task_row(task.id).await;
    assert_eq!(stored.pre_overtime_status(), Some(TaskStatus::Paused));
    assert!(stored.paused_at.is_some());
}

// ---------------------------------------------------------------------------
// Test: one failing task does not stop the scan
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failure_is_reported_and_scan_continues() {
    let h = Harness::new();
    let a = h.online_worker(20).await;
    let b = h.online_worker(21).await;
    let broken = h.running_task(&a, 30).await;
    let healthy = h.running_task(&b, 30).await;
    h.store.fail_commits_for(broken.id);
    h.advance(Duration::minutes(45));

    let report = h.engine.overtime.scan_once().await.unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.marked, vec![healthy.id]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, broken.id);
    assert_eq!(h.task_row(broken.id).await.status, TaskStatus::InProgress);
}

#[tokio::test]
async fn unreadable_store_fails_the_pass() {
    let h = Harness::new();
    h.store.set_offline(true);
    assert!(h.engine.overtime.scan_once().await.is_err());
}

// ---------------------------------------------------------------------------
// Test: scheduling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn suspend_and_resume_toggle() {
    let h = Harness::new();
    assert!(!h.engine.overtime.is_suspended());
    h.engine.overtime.suspend();
    assert!(h.engine.overtime.is_suspended());
    h.engine.overtime.resume();
    assert!(!h.engine.overtime.is_suspended());
}

#[tokio::test]
async fn run_loop_stops_on_cancel() {
    let h = Harness::with_config(EngineConfig {
        overtime_scan_interval: std::time::Duration::from_millis(10),
        ..Default::default()
    });
    let worker = h.online_worker(20).await;
    let task = h.running_task(&worker, 5).await;
    h.advance(Duration::minutes(6));

    let detector = Arc::clone(&h.engine.overtime);
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { detector.run(cancel).await }
    });

    for _ in 0..100 {
        if h.task_row(task.id).await.status == TaskStatus::Overtime {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(h.task_row(task.id).await.status, TaskStatus::Overtime);
}
