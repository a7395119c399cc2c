//! Caller roles and the per-operation capability table.
//!
//! The auth collaborator resolves every request to a `(user_id, Role)` pair.
//! Capability is checked once at the boundary via [`Role::can`]; ownership
//! rules (assigned worker, owning dispatcher) are enforced by the engine.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

pub const ROLE_DISPATCHER: &str = "dispatcher";
pub const ROLE_WORKER: &str = "worker";
pub const ROLE_ADMIN: &str = "admin";

/// The three roles a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Dispatcher,
    Worker,
    #[serde(rename = "admin")]
    Administrator,
}

/// Every externally invocable operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateTask,
    ViewTasks,
    AcceptTask,
    QueueTask,
    StartTask,
    PauseTask,
    ResumeTask,
    CompleteTask,
    CancelTask,
    RequestExtension,
    ReviewExtension,
    ExtendDirect,
    ViewWorkers,
    RegisterWorker,
    Reconcile,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Dispatcher => ROLE_DISPATCHER,
            Role::Worker => ROLE_WORKER,
            Role::Administrator => ROLE_ADMIN,
        }
    }

    /// Parse a role name as carried in tokens.
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            ROLE_DISPATCHER => Ok(Role::Dispatcher),
            ROLE_WORKER => Ok(Role::Worker),
            ROLE_ADMIN => Ok(Role::Administrator),
            other => Err(CoreError::Unauthorized(format!("Unknown role '{other}'"))),
        }
    }

    /// Capability table.
    pub fn can(self, op: Operation) -> bool {
        use Operation::*;
        match self {
            Role::Administrator => true,
            Role::Dispatcher => matches!(
                op,
                CreateTask
                    | ViewTasks
                    | PauseTask
                    | ResumeTask
                    | CompleteTask
                    | CancelTask
                    | ReviewExtension
                    | ExtendDirect
                    | ViewWorkers
            ),
            Role::Worker => matches!(
                op,
                ViewTasks
                    | AcceptTask
                    | QueueTask
                    | StartTask
                    | PauseTask
                    | ResumeTask
                    | CompleteTask
                    | RequestExtension
            ),
        }
    }

    /// Like [`can`](Self::can) but produces a `Forbidden` error.
    pub fn require(self, op: Operation) -> Result<(), CoreError> {
        if self.can(op) {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "Role '{}' may not perform {op:?}",
                self.as_str()
            )))
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: crate::types::DbId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: crate::types::DbId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Pseudo-actor for transitions made by background jobs.
    pub fn system() -> Self {
        Self {
            user_id: 0,
            role: Role::Administrator,
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == 0
    }
}
