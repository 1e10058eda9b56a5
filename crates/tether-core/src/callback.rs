use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::context::ContextHandle;
use crate::domain::Invocation;
use crate::error::CallbackError;

/// What a callback reports back to the executor.
pub type CallbackOutcome = Result<(), CallbackError>;

/// A unit of work in a chain.
///
/// Receives the shared invocation snapshot and a handle to the owning
/// context; long-running callbacks should poll `ctx.is_completed()` (or wait
/// on `ctx.cancellation()`) so that abort and Race cancellation can reach
/// them. Any closure `Fn(&Invocation, &ContextHandle) -> CallbackOutcome`
/// implements this trait.
pub trait Callback: Send + Sync {
    fn call(&self, invocation: &Invocation, ctx: &ContextHandle) -> CallbackOutcome;
}

impl<F> Callback for F
where
    F: Fn(&Invocation, &ContextHandle) -> CallbackOutcome + Send + Sync,
{
    fn call(&self, invocation: &Invocation, ctx: &ContextHandle) -> CallbackOutcome {
        self(invocation, ctx)
    }
}

/// Guard attached by `filter`: the record runs only when every guard accepts.
pub type Guard = Arc<dyn Fn(&Invocation) -> bool + Send + Sync>;

/// Invoke `callback`, turning a panic into a `CallbackError`.
pub(crate) fn invoke(
    callback: &dyn Callback,
    invocation: &Invocation,
    ctx: &ContextHandle,
) -> CallbackOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| callback.call(invocation, ctx))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(CallbackError::new(panic_message(payload.as_ref()))),
    }
}

/// Evaluate guards with the same panic containment as callbacks.
pub(crate) fn admits(guards: &[Guard], invocation: &Invocation) -> Result<bool, CallbackError> {
    if guards.is_empty() {
        return Ok(true);
    }
    panic::catch_unwind(AssertUnwindSafe(|| guards.iter().all(|guard| guard(invocation))))
        .map_err(|payload| CallbackError::new(format!("guard {}", panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
