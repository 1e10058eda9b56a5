//! Context identifiers.
//!
//! Contexts are identified by a ULID so the registry can remove them by
//! identity and log lines from concurrent runs can be told apart.
//! ULIDs sort by creation time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Identifier of one execution context.
///
/// Displayed as `ctx-<ulid>`.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(Ulid);

impl ContextId {
    /// Generate a fresh id from the wall clock and a random tail.
    pub fn generate() -> Self {
        let timestamp_ms = Utc::now().timestamp_millis() as u64;
        Self(Ulid::from_parts(timestamp_ms, rand::random()))
    }

    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl From<Ulid> for ContextId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}
