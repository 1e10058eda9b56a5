use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::Run;
use crate::callback::{self, CallbackOutcome};
use crate::context::ContextHandle;
use crate::domain::{AbortReason, CallbackResult};

/// One worker's report back to the driving thread.
pub(crate) struct WorkerEvent {
    pub index: usize,
    pub outcome: CallbackOutcome,
}

/// Why waiting for the next event stopped.
pub(crate) enum WaitError {
    DeadlineExceeded,
    /// Every worker is gone without reporting (should not happen).
    Disconnected,
}

/// One OS thread per admitted record of a run.
///
/// - Workers settle their own record and fire `on_next` under a mutex that
///   belongs to this group only.
/// - The driver reads reports with `next_event` and either joins the group
///   or hands the handles back as stragglers.
pub(crate) struct WorkerGroup {
    joins: Vec<JoinHandle<()>>,
    events: Receiver<WorkerEvent>,
    setup_failure: Option<AbortReason>,
}

impl WorkerGroup {
    /// Evaluate guards and spawn a worker for every admitted record.
    ///
    /// Stops launching at the first guard failure or spawn failure; the
    /// records that were not launched are settled as Error and the reason is
    /// kept in `setup_failure`.
    pub fn spawn(run: &Run<'_>) -> Self {
        let (tx, events) = channel::unbounded();
        let lock = Arc::new(Mutex::new(()));
        let mut joins = Vec::with_capacity(run.chain.len());
        let mut setup_failure = None;

        run.shared.set_active(0);

        for (index, record) in run.chain.iter().enumerate() {
            match record.admits(&run.invocation) {
                Ok(true) => {}
                Ok(false) => {
                    record.settle(CallbackResult::Skipped);
                    debug!(context = %run.shared.id(), index, "callback skipped by guard");
                    continue;
                }
                Err(err) => {
                    setup_failure = Some(AbortReason::CallbackFailed {
                        index,
                        message: err.to_string(),
                    });
                    run.chain.settle_pending_from(index, CallbackResult::Error);
                    break;
                }
            }

            let shared = Arc::clone(run.shared);
            let invocation = Arc::clone(&run.invocation);
            let callback = Arc::clone(record.callback());
            let cell = Arc::clone(record.cell());
            let lock = Arc::clone(&lock);
            let tx = tx.clone();

            let mut builder =
                thread::Builder::new().name(format!("{}-{index}", run.options.worker_name_prefix));
            if let Some(size) = run.options.worker_stack_size {
                builder = builder.stack_size(size);
            }

            run.shared.increment_active();
            let spawned = builder.spawn(move || {
                let handle = ContextHandle::from_shared(Arc::clone(&shared));
                let outcome = callback::invoke(callback.as_ref(), &invocation, &handle);
                {
                    let _guard = lock.lock();
                    let result = if outcome.is_ok() {
                        CallbackResult::Success
                    } else {
                        CallbackResult::Error
                    };
                    cell.settle(result);
                    shared.decrement_active();
                    if outcome.is_ok() {
                        shared.fire_next(&invocation);
                    }
                }
                // the driver may have stopped listening (race decided, deadline)
                let _ = tx.send(WorkerEvent { index, outcome });
            });

            match spawned {
                Ok(join) => joins.push(join),
                Err(err) => {
                    run.shared.decrement_active();
                    warn!(context = %run.shared.id(), index, error = %err, "worker spawn failed");
                    setup_failure = Some(AbortReason::Spawn {
                        index,
                        message: err.to_string(),
                    });
                    run.chain.settle_pending_from(index, CallbackResult::Error);
                    break;
                }
            }
        }

        debug!(
            context = %run.shared.id(),
            launched = joins.len(),
            "workers launched"
        );

        Self {
            joins,
            events,
            setup_failure,
        }
    }

    pub fn launched(&self) -> usize {
        self.joins.len()
    }

    pub fn take_setup_failure(&mut self) -> Option<AbortReason> {
        self.setup_failure.take()
    }

    /// Wait for the next worker report, up to `deadline`.
    pub fn next_event(&self, deadline: Option<Instant>) -> Result<WorkerEvent, WaitError> {
        match deadline {
            Some(at) => self.events.recv_deadline(at).map_err(|e| match e {
                RecvTimeoutError::Timeout => WaitError::DeadlineExceeded,
                RecvTimeoutError::Disconnected => WaitError::Disconnected,
            }),
            None => self.events.recv().map_err(|_| WaitError::Disconnected),
        }
    }

    /// Wait for every launched worker to exit.
    pub fn join(self) {
        for join in self.joins {
            if join.join().is_err() {
                warn!("worker thread panicked outside its callback");
            }
        }
    }

    /// Give up on the group without joining it.
    pub fn into_stragglers(self) -> Vec<JoinHandle<()>> {
        self.joins
    }
}
