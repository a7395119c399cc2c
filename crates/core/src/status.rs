//! Status enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding lookup table, and its name matches the `name`
//! column of that table.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Every variant in seed order.
            pub const ALL: &'static [$name] = &[$( $name::$variant ),+];

            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// The lookup-table name of this status.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }

            /// Parse the lookup-table name of this status.
            pub fn parse(name: &str) -> Option<Self> {
                match name {
                    $( $label => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl TryFrom<StatusId> for $name {
            type Error = CoreError;

            fn try_from(id: StatusId) -> Result<Self, Self::Error> {
                $name::from_id(id).ok_or_else(|| {
                    CoreError::Internal(format!(concat!("Unknown ", stringify!($name), " id {}"), id))
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

define_status_enum! {
    /// Task lifecycle status.
    TaskStatus {
        Pending = 1 => "pending",
        Accepted = 2 => "accepted",
        Queued = 3 => "queued",
        InProgress = 4 => "in_progress",
        Paused = 5 => "paused",
        Overtime = 6 => "overtime",
        Completed = 7 => "completed",
        Cancelled = 8 => "cancelled",
    }
}

define_status_enum! {
    /// Worker availability.
    Availability {
        Idle = 1 => "idle",
        Busy = 2 => "busy",
        Offline = 3 => "offline",
    }
}

define_status_enum! {
    /// Extension request review status.
    ExtensionStatus {
        Pending = 1 => "pending",
        Approved = 2 => "approved",
        Rejected = 3 => "rejected",
    }
}

impl TaskStatus {
    /// Statuses in which a task holds its assigned worker.
    pub const ACTIVE: [TaskStatus; 5] = [
        TaskStatus::Accepted,
        TaskStatus::Queued,
        TaskStatus::InProgress,
        TaskStatus::Paused,
        TaskStatus::Overtime,
    ];

    /// Statuses the overtime detector scans.
    pub const TIMED: [TaskStatus; 2] = [TaskStatus::InProgress, TaskStatus::Paused];

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// True when a task in this status must carry an assigned worker.
    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    /// True when a worker may ask for more time.
    pub fn accepts_extension(self) -> bool {
        matches!(
            self,
            TaskStatus::InProgress | TaskStatus::Paused | TaskStatus::Overtime
        )
    }
}
