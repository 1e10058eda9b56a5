//! Execution report: the shape of what one run produced.
//!
//! The report is delivered to `on_complete` and returned from `execute`, so
//! callers can inspect per-callback results without touching the chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CallbackResult, ContextId, Strategy};
use crate::error::TetherError;
use crate::observability::ChainCounts;

/// Why a context completed through the error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// `abort()` was called on the context or one of its handles.
    Requested,

    /// A termination signal arrived and the registry cleanup pass ran.
    Signal { signal: i32 },

    /// A callback returned an error or panicked.
    CallbackFailed { index: usize, message: String },

    /// A worker thread could not be spawned.
    Spawn { index: usize, message: String },

    /// The configured execution deadline expired.
    DeadlineExceeded,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::Requested => f.write_str("aborted on request"),
            AbortReason::Signal { signal } => write!(f, "interrupted by signal {signal}"),
            AbortReason::CallbackFailed { index, message } => {
                write!(f, "callback #{index} failed: {message}")
            }
            AbortReason::Spawn { index, message } => {
                write!(f, "worker for callback #{index} could not be spawned: {message}")
            }
            AbortReason::DeadlineExceeded => f.write_str("execution deadline exceeded"),
        }
    }
}

/// One failed callback, as collected by Merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedCallback {
    pub index: usize,
    pub message: String,
}

/// Result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub context: ContextId,
    pub strategy: Strategy,

    /// Per-record results, in chain order.
    pub results: Vec<CallbackResult>,

    /// Index of the record whose report completed a Race.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<usize>,

    /// Set when the run ended through the error path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aborted: Option<AbortReason>,

    /// Merge only: every failed callback, in chain order. The other
    /// strategies stop at the first failure, which `aborted` already names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedCallback>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Did the run finish through `on_complete`?
    pub fn is_success(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn counts(&self) -> ChainCounts {
        ChainCounts::from_results(&self.results)
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// `Ok(self)` on success, otherwise the abort reason as a [`TetherError`].
    pub fn into_result(self) -> Result<Self, TetherError> {
        match self.aborted {
            Some(reason) => Err(TetherError::Aborted(reason)),
            None => Ok(self),
        }
    }
}
