//! Status enums, re-exported from `dispatch-core`.
//!
//! Model structs decode the SMALLINT `*_id` columns straight into these
//! enums via `#[sqlx(try_from = "i16")]`.

pub use dispatch_core::status::{Availability, ExtensionStatus, StatusId, TaskStatus};

/// Render a status list as SQL `IN (...)` literal ids.
///
/// Only ever fed from enum discriminants, never user input.
pub fn id_list<T: Copy + Into<StatusId>>(statuses: &[T]) -> String {
    statuses
        .iter()
        .map(|s| (*s).into().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
