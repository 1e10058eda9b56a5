//! Strategy executor.
//!
//! `execute` is the only entry point: it marks the context running, hands
//! the chain to the strategy, then settles the terminal transition and fires
//! exactly one of `on_complete` / `on_error` if this run owns it.
//!
//! # Terminal ownership
//! `completed` flips false -> true once per context. Whoever performs the
//! flip (a strategy failing fast, a Race winner, this module at the end of a
//! normal run, or an external `abort`) owns the terminal hook. Everybody
//! else fires nothing.

mod merge;
mod parallel;
mod race;
mod sequential;
mod worker;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::chain::CallbackChain;
use crate::config::ExecutionOptions;
use crate::context::ContextShared;
use crate::domain::{AbortReason, ExecutionReport, FailedCallback, Invocation, Strategy};

/// Everything a strategy needs for one run.
pub(crate) struct Run<'a> {
    pub shared: &'a Arc<ContextShared>,
    pub chain: &'a CallbackChain,
    pub options: &'a ExecutionOptions,
    pub invocation: Arc<Invocation>,
    pub deadline: Option<Instant>,
}

impl Run<'_> {
    pub fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|at| Instant::now() >= at)
    }
}

/// What a strategy hands back to the dispatcher.
#[derive(Default)]
pub(crate) struct StrategyOutcome {
    /// Race only: index of the record that completed the run.
    pub winner: Option<usize>,
    /// Why the run failed, if it did.
    pub failure: Option<AbortReason>,
    /// The strategy already performed the completion transition itself.
    pub claimed: bool,
    /// Merge only: every failure, in chain order.
    pub failures: Vec<FailedCallback>,
    /// Worker threads the strategy did not join.
    pub stragglers: Vec<JoinHandle<()>>,
}

impl StrategyOutcome {
    pub fn failed(reason: AbortReason) -> Self {
        Self {
            failure: Some(reason),
            ..Self::default()
        }
    }
}

pub(crate) fn execute(
    shared: &Arc<ContextShared>,
    chain: &CallbackChain,
    strategy: Strategy,
    options: &ExecutionOptions,
) -> (ExecutionReport, Vec<JoinHandle<()>>) {
    let started_at = Utc::now();
    shared.mark_running();

    let run = Run {
        shared,
        chain,
        options,
        invocation: shared.invocation(),
        deadline: options.deadline.map(|d| Instant::now() + d),
    };

    info!(
        context = %shared.id(),
        %strategy,
        callbacks = chain.len(),
        "execution started"
    );

    let outcome = if chain.is_empty() {
        StrategyOutcome::default()
    } else {
        match strategy {
            Strategy::Sequential => sequential::run(&run),
            Strategy::Parallel => parallel::run(&run),
            Strategy::Race => race::run(&run),
            Strategy::Merge => merge::run(&run),
        }
    };

    let owns_terminal = outcome.claimed || shared.claim(outcome.failure.clone());
    let report = ExecutionReport {
        context: shared.id(),
        strategy,
        results: chain.results(),
        winner: if owns_terminal { outcome.winner } else { None },
        aborted: shared.abort_reason(),
        failures: outcome.failures,
        started_at,
        finished_at: Utc::now(),
    };

    if owns_terminal {
        match &report.aborted {
            Some(reason) => {
                warn!(context = %shared.id(), %reason, "execution failed");
                shared.fire_error(&run.invocation, reason);
            }
            None => {
                info!(
                    context = %shared.id(),
                    %strategy,
                    winner = ?report.winner,
                    "execution completed"
                );
                shared.fire_complete(&run.invocation, &report);
            }
        }
    } else {
        debug!(
            context = %shared.id(),
            "context completed elsewhere during the run; no terminal hook fired"
        );
    }

    (report, outcome.stragglers)
}
