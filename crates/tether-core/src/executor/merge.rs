//! Merge: run everything concurrently, then aggregate.
//!
//! Unlike Parallel, a failing callback does not complete the context early;
//! the others keep running undisturbed. Once every worker has been joined the
//! failures are collected in chain order and the lowest index decides the
//! abort reason.

use tracing::debug;

use super::parallel;
use super::{Run, StrategyOutcome};
use crate::domain::{AbortReason, FailedCallback};
use crate::observability::ChainCounts;

pub(super) fn run(run: &Run<'_>) -> StrategyOutcome {
    let (mut outcome, mut events) = parallel::drive(run, false);
    events.sort_unstable_by_key(|event| event.index);

    outcome.failures = events
        .into_iter()
        .filter_map(|event| {
            event.outcome.err().map(|err| FailedCallback {
                index: event.index,
                message: err.to_string(),
            })
        })
        .collect();

    if outcome.failure.is_none()
        && let Some(first) = outcome.failures.first()
    {
        outcome.failure = Some(AbortReason::CallbackFailed {
            index: first.index,
            message: first.message.clone(),
        });
    }

    let counts = ChainCounts::from_results(&run.chain.results());
    debug!(
        context = %run.shared.id(),
        succeeded = counts.succeeded,
        failed = counts.failed,
        skipped = counts.skipped,
        pending = counts.pending,
        "merge aggregated"
    );

    outcome
}
