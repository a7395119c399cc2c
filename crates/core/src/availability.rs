//! Derivation of a worker's availability from its task load and liveness.

use crate::error::CoreError;
use crate::status::Availability;

/// The availability implied by the current store state.
///
/// - no live session: `offline`, whatever the task state
/// - exactly one active task: `busy`
/// - zero active tasks: `idle`
///
/// More than one active task violates the one-task-per-worker rule and is
/// reported rather than silently collapsed into `busy`.
pub fn expected_availability(
    active_task_count: usize,
    is_live: bool,
) -> Result<Availability, CoreError> {
    if active_task_count > 1 {
        return Err(CoreError::Conflict(format!(
            "Worker holds {active_task_count} active tasks"
        )));
    }
    Ok(match (is_live, active_task_count) {
        (false, _) => Availability::Offline,
        (true, 1) => Availability::Busy,
        (true, _) => Availability::Idle,
    })
}
