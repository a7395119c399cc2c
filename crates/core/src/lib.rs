//! Pure domain logic for task dispatch.
//!
//! Nothing in this crate performs I/O. Store access, broadcasting and
//! scheduling live in `dispatch-db`, `dispatch-events` and
//! `dispatch-engine`; this crate owns the rules they enforce.

pub mod availability;
pub mod clock;
pub mod error;
pub mod events;
pub mod extension;
pub mod liveness;
pub mod overtime;
pub mod roles;
pub mod status;
pub mod task_lifecycle;
pub mod types;
