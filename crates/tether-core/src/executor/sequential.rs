//! Sequential: every callback on the calling thread, in subscription order.

use std::sync::Arc;

use tracing::debug;

use super::{Run, StrategyOutcome};
use crate::callback;
use crate::context::ContextHandle;
use crate::domain::{AbortReason, CallbackResult};

pub(super) fn run(run: &Run<'_>) -> StrategyOutcome {
    let handle = ContextHandle::from_shared(Arc::clone(run.shared));

    for (index, record) in run.chain.iter().enumerate() {
        // abort (or a signal) may have completed the context under us
        if run.shared.is_completed() {
            debug!(context = %run.shared.id(), index, "context completed mid-run; stopping");
            break;
        }
        if run.deadline_passed() {
            return StrategyOutcome::failed(AbortReason::DeadlineExceeded);
        }

        match record.admits(&run.invocation) {
            Ok(true) => {}
            Ok(false) => {
                record.settle(CallbackResult::Skipped);
                debug!(context = %run.shared.id(), index, "callback skipped by guard");
                continue;
            }
            Err(err) => return fail(run, index, err.to_string()),
        }

        run.shared.set_active(1);
        let outcome = callback::invoke(record.callback().as_ref(), &run.invocation, &handle);
        run.shared.set_active(0);

        match outcome {
            Ok(()) => {
                record.settle(CallbackResult::Success);
                debug!(context = %run.shared.id(), index, "callback succeeded");
                run.shared.fire_next(&run.invocation);
            }
            Err(err) => return fail(run, index, err.to_string()),
        }
    }

    StrategyOutcome::default()
}

/// The record at `index` failed: it and everything after it become Error.
fn fail(run: &Run<'_>, index: usize, message: String) -> StrategyOutcome {
    run.chain.settle_pending_from(index, CallbackResult::Error);
    StrategyOutcome::failed(AbortReason::CallbackFailed { index, message })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use crate::context::ExecutionContext;
    use crate::domain::{AbortReason, CallbackResult, Invocation, Strategy};
    use crate::error::CallbackError;

    #[test]
    fn runs_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ExecutionContext::new(Strategy::Sequential);
        for i in 0..3 {
            let log = Arc::clone(&log);
            ctx.subscribe(move |_, _| {
                log.lock().push(i);
                Ok(())
            });
        }

        let report = ctx.execute().unwrap();

        assert!(report.is_success());
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(report.results, vec![CallbackResult::Success; 3]);
    }

    #[test]
    fn hooks_fire_after_each_callback_and_complete_last() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut ctx = ExecutionContext::new(Strategy::Sequential);
        for i in 0..2 {
            let log = Arc::clone(&log);
            ctx.subscribe(move |_, _| {
                log.lock().push(format!("cb{i}"));
                Ok(())
            });
        }
        {
            let log = Arc::clone(&log);
            ctx.on_next(move |_| log.lock().push("next".to_string()));
        }
        {
            let log = Arc::clone(&log);
            ctx.on_complete(move |_, report| {
                assert_eq!(report.results.len(), 2);
                log.lock().push("complete".to_string());
            });
        }

        ctx.execute();

        assert_eq!(*log.lock(), vec!["cb0", "next", "cb1", "next", "complete"]);
    }

    #[test]
    fn callbacks_see_the_invocation_snapshot() {
        let seen = Arc::new(Mutex::new(None));
        let mut ctx = ExecutionContext::with_invocation(
            Strategy::Sequential,
            Invocation::new(["tether", "client"]).with_env([("TERM", "xterm")]),
        );
        {
            let seen = Arc::clone(&seen);
            ctx.subscribe(move |inv, _| {
                *seen.lock() = Some((inv.arg(1).map(str::to_string), inv.env_var("TERM").map(str::to_string)));
                Ok(())
            });
        }

        ctx.execute();

        assert_eq!(
            *seen.lock(),
            Some((Some("client".to_string()), Some("xterm".to_string())))
        );
    }

    #[test]
    fn abort_from_a_callback_stops_the_chain() {
        let ran = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));
        let completes = Arc::new(AtomicUsize::new(0));
        let mut ctx = ExecutionContext::new(Strategy::Sequential);
        {
            let ran = Arc::clone(&ran);
            ctx.subscribe(move |_, ctx| {
                ran.fetch_add(1, Ordering::SeqCst);
                ctx.abort();
                Ok(())
            });
        }
        {
            let ran = Arc::clone(&ran);
            ctx.subscribe(move |_, _| {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        {
            let errors = Arc::clone(&errors);
            ctx.on_error(move |_, _| {
                errors.fetch_add(1, Ordering::SeqCst);
            });
        }
        {
            let completes = Arc::clone(&completes);
            ctx.on_complete(move |_, _| {
                completes.fetch_add(1, Ordering::SeqCst);
            });
        }

        let report = ctx.execute().unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(completes.load(Ordering::SeqCst), 0);
        assert_eq!(report.aborted, Some(AbortReason::Requested));
        // partial completion: the second record never ran
        assert_eq!(
            report.results,
            vec![CallbackResult::Success, CallbackResult::Pending]
        );
    }

    #[test]
    fn failure_marks_the_rest_of_the_chain_as_error() {
        let ran_after = Arc::new(AtomicUsize::new(0));
        let mut ctx = ExecutionContext::new(Strategy::Sequential);
        ctx.subscribe(|_, _| Ok(()))
            .subscribe(|_, _| Err(CallbackError::new("connect refused")));
        {
            let ran_after = Arc::clone(&ran_after);
            ctx.subscribe(move |_, _| {
                ran_after.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let report = ctx.execute().unwrap();

        assert_eq!(ran_after.load(Ordering::SeqCst), 0);
        assert_eq!(
            report.results,
            vec![
                CallbackResult::Success,
                CallbackResult::Error,
                CallbackResult::Error
            ]
        );
        assert!(ctx.is_completed());
    }

    #[test]
    fn merged_chains_run_recipient_then_donor() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut a = ExecutionContext::new(Strategy::Sequential);
        let mut b = ExecutionContext::new(Strategy::Sequential);
        for (ctx, name) in [(&mut a, "a"), (&mut b, "b")] {
            for i in 0..2 {
                let log = Arc::clone(&log);
                ctx.subscribe(move |_, _| {
                    log.lock().push(format!("{name}{i}"));
                    Ok(())
                });
            }
        }

        a.merge_with(&mut b);
        a.execute();
        b.execute();

        assert_eq!(*log.lock(), vec!["a0", "a1", "b0", "b1"]);
        assert!(b.is_empty());
    }
}
