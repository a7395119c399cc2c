//! Session liveness predicate.

use chrono::Duration;

use crate::types::Timestamp;

/// Default window within which a session must have seen activity.
pub const DEFAULT_LIVENESS_WINDOW_SECS: i64 = 300;

/// The session fields that decide liveness.
#[derive(Debug, Clone, Copy)]
pub struct SessionState {
    pub is_active: bool,
    pub expires_at: Timestamp,
    pub last_activity_at: Timestamp,
}

/// A session is live iff it is active, unexpired, and recently used.
pub fn is_live(session: &SessionState, now: Timestamp, window: Duration) -> bool {
    session.is_active && session.expires_at > now && now - session.last_activity_at <= window
}

/// A user is live iff any of their sessions is live.
pub fn any_live<'a>(
    sessions: impl IntoIterator<Item = &'a SessionState>,
    now: Timestamp,
    window: Duration,
) -> bool {
    sessions.into_iter().any(|s| is_live(s, now, window))
}
