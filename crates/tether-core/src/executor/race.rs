//! Race: the first worker to report decides the run.

use tracing::debug;

use super::worker::{WaitError, WorkerGroup};
use super::{Run, StrategyOutcome};
use crate::domain::AbortReason;

pub(super) fn run(run: &Run<'_>) -> StrategyOutcome {
    let mut group = WorkerGroup::spawn(run);
    let mut outcome = StrategyOutcome::default();

    if let Some(reason) = group.take_setup_failure() {
        outcome.claimed = run.shared.claim(Some(reason.clone()));
        outcome.failure = Some(reason);
    }

    if group.launched() == 0 {
        // everything was skipped or failed to launch
        group.join();
        return outcome;
    }

    match group.next_event(run.deadline) {
        Ok(event) => {
            let failure = event.outcome.as_ref().err().map(|err| AbortReason::CallbackFailed {
                index: event.index,
                message: err.to_string(),
            });
            if run.shared.claim(failure.clone()) {
                debug!(context = %run.shared.id(), winner = event.index, "race decided");
                outcome.claimed = true;
                outcome.winner = Some(event.index);
                outcome.failure = failure;
            }
        }
        Err(WaitError::DeadlineExceeded) => {
            if !outcome.claimed {
                outcome.failure = Some(AbortReason::DeadlineExceeded);
            }
        }
        Err(WaitError::Disconnected) => {}
    }

    outcome.stragglers = group.into_stragglers();
    outcome
}
