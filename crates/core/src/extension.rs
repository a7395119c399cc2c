//! Extension request bounds and review decisions.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Smallest extension a worker may ask for, in minutes.
pub const DEFAULT_MIN_EXTENSION_MINUTES: i32 = 5;

/// Largest extension a worker may ask for, in minutes.
pub const DEFAULT_MAX_EXTENSION_MINUTES: i32 = 480;

/// Maximum length of a request or review reason.
pub const MAX_REASON_LEN: usize = 500;

/// Review reason recorded when a task terminates with a request still open.
pub const AUTO_REJECT_REASON: &str = "Task reached a terminal state before review";

/// Inclusive bound on requested minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionBounds {
    pub min_minutes: i32,
    pub max_minutes: i32,
}

impl Default for ExtensionBounds {
    fn default() -> Self {
        Self {
            min_minutes: DEFAULT_MIN_EXTENSION_MINUTES,
            max_minutes: DEFAULT_MAX_EXTENSION_MINUTES,
        }
    }
}

impl ExtensionBounds {
    /// Validate requested minutes against the bound.
    pub fn validate(&self, minutes: i32) -> Result<(), CoreError> {
        if minutes < self.min_minutes || minutes > self.max_minutes {
            return Err(CoreError::Validation(format!(
                "Extension must be between {} and {} minutes, got {minutes}",
                self.min_minutes, self.max_minutes
            )));
        }
        Ok(())
    }
}

/// A dispatcher's verdict on an extension request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

/// Validate an optional free-text reason.
pub fn validate_reason(reason: Option<&str>) -> Result<(), CoreError> {
    match reason {
        Some(r) if r.chars().count() > MAX_REASON_LEN => Err(CoreError::Validation(format!(
            "Reason must not exceed {MAX_REASON_LEN} characters"
        ))),
        _ => Ok(()),
    }
}
