//! Real-time event names consumed by the presentation layer.

pub const EVENT_TASK_CREATED: &str = "task_created";
pub const EVENT_TASK_ACCEPTED: &str = "task_accepted";
pub const EVENT_TASK_QUEUED: &str = "task_queued";
pub const EVENT_TASK_STARTED: &str = "task_started";
pub const EVENT_TASK_PAUSED: &str = "task_paused";
pub const EVENT_TASK_RESUMED: &str = "task_resumed";
pub const EVENT_TASK_OVERTIME: &str = "task_overtime";
pub const EVENT_TASK_COMPLETED: &str = "task_completed";
pub const EVENT_TASK_CANCELLED: &str = "task_cancelled";

/// Allotted duration changed (approved request or direct extension).
pub const EVENT_TASK_EXTENDED: &str = "task_extended";

/// A task held by an offline worker needs a dispatcher's decision.
pub const EVENT_TASK_ATTENTION: &str = "task_attention";

pub const EVENT_WORKER_STATUS_CHANGED: &str = "worker_status_changed";
pub const EVENT_EXTENSION_REQUESTED: &str = "extension_requested";
pub const EVENT_EXTENSION_REVIEWED: &str = "extension_reviewed";

/// Reason tags carried by `worker_status_changed`.
pub const REASON_TASK_TRANSITION: &str = "task_transition";
pub const REASON_SYSTEM_CORRECTED: &str = "system_corrected";
pub const REASON_LIVENESS_LOST: &str = "liveness_lost";
pub const REASON_SESSION_CHANGE: &str = "session_change";
