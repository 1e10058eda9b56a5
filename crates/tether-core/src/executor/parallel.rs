//! Parallel: one worker per callback, join them all, then complete.
//!
//! Fail-fast: the first failing callback completes the context immediately
//! (so cooperative callbacks can stop), but the driver still joins every
//! worker before `on_error` fires.

use tracing::{debug, warn};

use super::worker::{WaitError, WorkerEvent, WorkerGroup};
use super::{Run, StrategyOutcome};
use crate::domain::AbortReason;

pub(super) fn run(run: &Run<'_>) -> StrategyOutcome {
    drive(run, true).0
}

/// Spawn, wait for every report, join.
///
/// With `fail_fast` (Parallel) the first failure claims the completion
/// transition at once, which cancels cooperative callbacks. Without it
/// (Merge) failures are only logged and every callback runs undisturbed.
/// Setup failures always claim. Returns the events in arrival order.
pub(super) fn drive(run: &Run<'_>, fail_fast: bool) -> (StrategyOutcome, Vec<WorkerEvent>) {
    let mut group = WorkerGroup::spawn(run);
    let mut outcome = StrategyOutcome::default();
    let mut events = Vec::with_capacity(group.launched());

    if let Some(reason) = group.take_setup_failure() {
        outcome.claimed = run.shared.claim(Some(reason.clone()));
        outcome.failure = Some(reason);
    }

    let mut remaining = group.launched();
    while remaining > 0 {
        match group.next_event(run.deadline) {
            Ok(event) => {
                remaining -= 1;
                if let Err(err) = &event.outcome {
                    warn!(context = %run.shared.id(), index = event.index, error = %err, "callback failed");
                    if fail_fast && outcome.failure.is_none() {
                        let reason = AbortReason::CallbackFailed {
                            index: event.index,
                            message: err.to_string(),
                        };
                        outcome.claimed = run.shared.claim(Some(reason.clone()));
                        outcome.failure = Some(reason);
                    }
                }
                events.push(event);
            }
            Err(WaitError::DeadlineExceeded) => {
                debug!(context = %run.shared.id(), remaining, "deadline hit while waiting for workers");
                if !outcome.claimed {
                    outcome.failure = Some(AbortReason::DeadlineExceeded);
                }
                outcome.stragglers = group.into_stragglers();
                return (outcome, events);
            }
            Err(WaitError::Disconnected) => {
                warn!(context = %run.shared.id(), remaining, "workers exited without reporting");
                break;
            }
        }
    }

    group.join();
    (outcome, events)
}
