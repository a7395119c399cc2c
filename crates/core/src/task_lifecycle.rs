//! Task transition table and creation rules.
//!
//! ```text
//! pending ──accept──▶ accepted ──queue──▶ queued
//!                        │                  │
//!                        └──────start───────┘
//!                                 ▼
//!                            in_progress ◀──resume── paused
//!                                 │ ──pause──▶        │
//!                                 ├──────overtime─────┤
//!                                 ▼                   ▼
//!                              overtime ──complete──▶ completed
//! any non-terminal ──cancel──▶ cancelled
//! ```
//!
//! Everything here is synchronous and side-effect free. The engine reads
//! the stored state, asks [`next_status`] whether the action is legal, and
//! commits the result with a conditional update.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::status::TaskStatus;

/// Upper bound on a task's initial allotted duration, in minutes.
pub const DEFAULT_TASK_MAX_MINUTES: i32 = 1440;

/// Maximum title length.
pub const MAX_TITLE_LEN: u64 = 200;

/// Maximum notes length.
pub const MAX_NOTES_LEN: u64 = 2000;

/// An action that moves a task between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    Accept,
    Queue,
    Start,
    Pause,
    Resume,
    Complete,
    Cancel,
    MarkOvertime,
}

impl TaskAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskAction::Accept => "accept",
            TaskAction::Queue => "queue",
            TaskAction::Start => "start",
            TaskAction::Pause => "pause",
            TaskAction::Resume => "resume",
            TaskAction::Complete => "complete",
            TaskAction::Cancel => "cancel",
            TaskAction::MarkOvertime => "mark_overtime",
        }
    }

    /// Source states from which this action is legal.
    pub fn sources(self) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match self {
            TaskAction::Accept => &[Pending],
            TaskAction::Queue => &[Accepted],
            TaskAction::Start => &[Accepted, Queued],
            TaskAction::Pause => &[InProgress],
            TaskAction::Resume => &[Paused],
            TaskAction::Complete => &[InProgress, Paused, Overtime],
            TaskAction::Cancel => &[Pending, Accepted, Queued, InProgress, Paused, Overtime],
            TaskAction::MarkOvertime => &[InProgress, Paused],
        }
    }

    /// True when the action takes the worker off the task.
    pub fn releases_worker(self) -> bool {
        matches!(self, TaskAction::Complete | TaskAction::Cancel)
    }
}

/// Compute the status a task moves to, or `InvalidState`.
pub fn next_status(current: TaskStatus, action: TaskAction) -> Result<TaskStatus, CoreError> {
    if !action.sources().contains(&current) {
        return Err(CoreError::InvalidState(format!(
            "Cannot {} a task that is {current}",
            action.as_str()
        )));
    }
    Ok(match action {
        TaskAction::Accept => TaskStatus::Accepted,
        TaskAction::Queue => TaskStatus::Queued,
        TaskAction::Start | TaskAction::Resume => TaskStatus::InProgress,
        TaskAction::Pause => TaskStatus::Paused,
        TaskAction::Complete => TaskStatus::Completed,
        TaskAction::Cancel => TaskStatus::Cancelled,
        TaskAction::MarkOvertime => TaskStatus::Overtime,
    })
}

/// Dispatcher input for a new task.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTaskSpec {
    #[validate(length(min = 1, max = MAX_TITLE_LEN, message = "title is empty or too long"))]
    pub title: String,
    #[validate(length(max = MAX_NOTES_LEN, message = "notes are too long"))]
    pub notes: Option<String>,
    /// Allotted duration in minutes.
    pub allotted_minutes: i32,
}

/// Validate a create request against field rules and the duration bound.
pub fn validate_new_task(spec: &NewTaskSpec, max_minutes: i32) -> Result<(), CoreError> {
    spec.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    if spec.title.trim().is_empty() {
        return Err(CoreError::Validation("title must not be blank".to_string()));
    }
    if spec.allotted_minutes <= 0 {
        return Err(CoreError::Validation(
            "allotted_minutes must be greater than zero".to_string(),
        ));
    }
    if spec.allotted_minutes > max_minutes {
        return Err(CoreError::Validation(format!(
            "allotted_minutes must not exceed {max_minutes}"
        )));
    }
    Ok(())
}
