//! Execution strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TetherError;

/// How a context drives its chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// One callback after another, on the calling thread.
    #[default]
    Sequential,

    /// One worker thread per callback; completes after every worker is joined.
    Parallel,

    /// One worker thread per callback; completes when the first one reports.
    Race,

    /// Parallel, then the per-callback results are aggregated in chain order.
    Merge,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Sequential,
        Strategy::Parallel,
        Strategy::Race,
        Strategy::Merge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Sequential => "sequential",
            Strategy::Parallel => "parallel",
            Strategy::Race => "race",
            Strategy::Merge => "merge",
        }
    }

    /// Does this strategy fan out to worker threads?
    pub fn is_concurrent(self) -> bool {
        !matches!(self, Strategy::Sequential)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = TetherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TetherError::UnknownStrategy(s.to_string()))
    }
}
