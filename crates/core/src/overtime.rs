//! Elapsed-time computation for overtime detection.
//!
//! Whether time spent paused counts toward a task's allotted duration is a
//! deployment choice, expressed as [`PausePolicy`].

use crate::types::Timestamp;

/// How paused time is treated when computing elapsed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PausePolicy {
    /// Wall-clock time since start, pauses included.
    #[default]
    IncludePaused,
    /// Only time spent actually working.
    ExcludePaused,
}

/// The timing fields of a task relevant to elapsed-time computation.
#[derive(Debug, Clone, Copy)]
pub struct TaskClock {
    pub started_at: Option<Timestamp>,
    /// Start of the current pause, if the task is paused.
    pub paused_at: Option<Timestamp>,
    /// Seconds spent in completed pauses.
    pub paused_secs: i64,
}

/// Elapsed seconds at `now`. Zero for tasks that never started.
pub fn elapsed_secs(clock: &TaskClock, now: Timestamp, policy: PausePolicy) -> i64 {
    let Some(started_at) = clock.started_at else {
        return 0;
    };
    let wall = (now - started_at).num_seconds().max(0);
    match policy {
        PausePolicy::IncludePaused => wall,
        PausePolicy::ExcludePaused => {
            let current_pause = clock
                .paused_at
                .map(|p| (now - p).num_seconds().max(0))
                .unwrap_or(0);
            (wall - clock.paused_secs - current_pause).max(0)
        }
    }
}

/// True when elapsed time has reached the allotted duration.
pub fn is_overdue(
    clock: &TaskClock,
    allotted_minutes: i32,
    now: Timestamp,
    policy: PausePolicy,
) -> bool {
    clock.started_at.is_some()
        && elapsed_secs(clock, now, policy) >= i64::from(allotted_minutes) * 60
}
