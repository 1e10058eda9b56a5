use serde::{Deserialize, Serialize};

use crate::domain::CallbackResult;

/// Per-result counts for one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCounts {
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ChainCounts {
    pub fn from_results(results: &[CallbackResult]) -> Self {
        let mut counts = ChainCounts::default();
        for result in results {
            match result {
                CallbackResult::Pending => counts.pending += 1,
                CallbackResult::Success => counts.succeeded += 1,
                CallbackResult::Error => counts.failed += 1,
                CallbackResult::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.succeeded + self.failed + self.skipped
    }
}
