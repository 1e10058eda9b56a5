//! Callback and execution states.

use serde::{Deserialize, Serialize};

/// Last observed result of one chain record.
///
/// State transitions:
/// - Pending -> Success (callback returned Ok)
/// - Pending -> Error (callback failed, or the run failed before reaching it)
/// - Pending -> Skipped (a guard rejected the invocation)
///
/// A record that was never reached (abort, deadline) stays Pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackResult {
    #[default]
    Pending,
    Success,
    Error,
    Skipped,
}

impl CallbackResult {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        !matches!(self, CallbackResult::Pending)
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            CallbackResult::Pending => 0,
            CallbackResult::Success => 1,
            CallbackResult::Error => 2,
            CallbackResult::Skipped => 3,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            1 => CallbackResult::Success,
            2 => CallbackResult::Error,
            3 => CallbackResult::Skipped,
            _ => CallbackResult::Pending,
        }
    }
}

/// Lifecycle of a context's (single) execution.
///
/// NotStarted -> Running -> Completed. Completed is terminal; abort can jump
/// straight from NotStarted to Completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    NotStarted,
    Running,
    Completed,
}
