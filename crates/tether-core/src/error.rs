use thiserror::Error;

use crate::domain::AbortReason;

/// Operational classification of a [`TetherError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A thread (worker or signal listener) could not be created.
    ResourceExhausted,
    /// A callback returned an error or panicked.
    CallbackFailure,
    /// The execution was aborted (explicitly, by signal or by deadline).
    AbortedExecution,
    /// Bad input: unknown strategy name, malformed configuration, ...
    InvalidOperation,
}

#[derive(Debug, Error)]
pub enum TetherError {
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read configuration {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("signal bridge could not be installed: {0}")]
    SignalBridge(String),

    #[error("execution aborted: {0}")]
    Aborted(AbortReason),
}

impl TetherError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TetherError::UnknownStrategy(_)
            | TetherError::Config(_)
            | TetherError::ConfigIo { .. } => ErrorKind::InvalidOperation,
            TetherError::Spawn { .. } | TetherError::SignalBridge(_) => {
                ErrorKind::ResourceExhausted
            }
            TetherError::Aborted(AbortReason::CallbackFailed { .. }) => {
                ErrorKind::CallbackFailure
            }
            TetherError::Aborted(_) => ErrorKind::AbortedExecution,
        }
    }
}

impl From<AbortReason> for TetherError {
    fn from(reason: AbortReason) -> Self {
        TetherError::Aborted(reason)
    }
}

/// Error returned by a callback to fail the execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CallbackError {
    message: String,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for CallbackError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for CallbackError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
