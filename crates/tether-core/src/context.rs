//! Execution context: one chain, one strategy, one completion flag.
//!
//! The context itself is owned by whoever built it and is mutated through
//! `&mut self` (subscribe, merge, switch strategy, execute). State that other
//! threads must see (completion flag, hooks, invocation snapshot, active
//! count) lives in a shared block reachable through [`ContextHandle`]s and,
//! weakly, from the [`ContextRegistry`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::callback::{Callback, CallbackOutcome, Guard};
use crate::chain::{CallbackChain, Payload};
use crate::config::{EngineConfig, ExecutionOptions};
use crate::domain::{
    AbortReason, CallbackResult, ContextId, ExecutionReport, ExecutionState, Invocation, Strategy,
};
use crate::executor;
use crate::registry::ContextRegistry;

pub type NextHook = Arc<dyn Fn(&Invocation) + Send + Sync>;
pub type CompleteHook = Arc<dyn Fn(&Invocation, &ExecutionReport) + Send + Sync>;
pub type ErrorHook = Arc<dyn Fn(&Invocation, &AbortReason) + Send + Sync>;

#[derive(Clone, Default)]
struct Hooks {
    on_next: Option<NextHook>,
    on_complete: Option<CompleteHook>,
    on_error: Option<ErrorHook>,
}

/// State shared between the owner, callbacks, workers and the registry.
pub(crate) struct ContextShared {
    id: ContextId,
    /// Completion flag, doubling as the cooperative cancellation token.
    completed: watch::Sender<bool>,
    running: AtomicBool,
    active_count: AtomicUsize,
    abort_reason: Mutex<Option<AbortReason>>,
    invocation: RwLock<Arc<Invocation>>,
    hooks: RwLock<Hooks>,
}

impl ContextShared {
    fn new(id: ContextId, invocation: Invocation) -> Self {
        let (completed, _) = watch::channel(false);
        Self {
            id,
            completed,
            running: AtomicBool::new(false),
            active_count: AtomicUsize::new(0),
            abort_reason: Mutex::new(None),
            invocation: RwLock::new(Arc::new(invocation)),
            hooks: RwLock::new(Hooks::default()),
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn is_completed(&self) -> bool {
        *self.completed.borrow()
    }

    pub(crate) fn state(&self) -> ExecutionState {
        if self.is_completed() {
            ExecutionState::Completed
        } else if self.running.load(Ordering::Acquire) {
            ExecutionState::Running
        } else {
            ExecutionState::NotStarted
        }
    }

    pub(crate) fn mark_running(&self) {
        self.running.store(true, Ordering::Release);
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, n: usize) {
        self.active_count.store(n, Ordering::Release);
    }

    pub(crate) fn increment_active(&self) {
        self.active_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn decrement_active(&self) {
        // saturating: a late straggler must never wrap the counter
        let _ = self
            .active_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Perform the false -> true transition of `completed`.
    ///
    /// Returns true for exactly one caller per context; that caller owns the
    /// terminal hook. `reason` is recorded when the transition happens.
    pub(crate) fn claim(&self, reason: Option<AbortReason>) -> bool {
        // reason is stored before receivers can observe the flip
        self.completed.send_if_modified(|done| {
            if *done {
                return false;
            }
            if reason.is_some() {
                *self.abort_reason.lock() = reason;
            }
            *done = true;
            true
        })
    }

    pub(crate) fn abort_reason(&self) -> Option<AbortReason> {
        self.abort_reason.lock().clone()
    }

    /// Complete the context through the error path.
    pub(crate) fn abort(&self, reason: AbortReason) -> bool {
        if !self.claim(Some(reason.clone())) {
            debug!(context = %self.id, "abort ignored: context already completed");
            return false;
        }
        warn!(context = %self.id, %reason, "execution aborted");
        self.fire_error(&self.invocation(), &reason);
        true
    }

    pub(crate) fn invocation(&self) -> Arc<Invocation> {
        Arc::clone(&self.invocation.read())
    }

    pub(crate) fn subscribe_completion(&self) -> watch::Receiver<bool> {
        self.completed.subscribe()
    }

    /// Fire `on_next`; never fires once the context has completed.
    pub(crate) fn fire_next(&self, invocation: &Invocation) {
        if self.is_completed() {
            return;
        }
        let hook = self.hooks.read().on_next.clone();
        if let Some(hook) = hook {
            hook(invocation);
        }
    }

    pub(crate) fn fire_complete(&self, invocation: &Invocation, report: &ExecutionReport) {
        let hook = self.hooks.read().on_complete.clone();
        if let Some(hook) = hook {
            hook(invocation, report);
        }
    }

    pub(crate) fn fire_error(&self, invocation: &Invocation, reason: &AbortReason) {
        let hook = self.hooks.read().on_error.clone();
        if let Some(hook) = hook {
            hook(invocation, reason);
        }
    }
}

/// Cloneable view of a context, handed to callbacks and usable from any
/// thread.
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<ContextShared>,
}

impl ContextHandle {
    pub(crate) fn from_shared(shared: Arc<ContextShared>) -> Self {
        Self { shared }
    }

    pub fn id(&self) -> ContextId {
        self.shared.id()
    }

    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    pub fn state(&self) -> ExecutionState {
        self.shared.state()
    }

    /// Advisory abort. See [`ExecutionContext::abort`].
    pub fn abort(&self) -> bool {
        self.shared.abort(AbortReason::Requested)
    }

    /// Receiver that observes `true` once the context completes.
    pub fn cancellation(&self) -> watch::Receiver<bool> {
        self.shared.subscribe_completion()
    }

    pub fn invocation(&self) -> Arc<Invocation> {
        self.shared.invocation()
    }

    /// Number of callbacks currently in flight.
    pub fn active_count(&self) -> usize {
        self.shared.active_count()
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("id", &self.shared.id())
            .field("state", &self.shared.state())
            .finish()
    }
}

/// Builder for [`ExecutionContext`].
///
/// ```ignore
/// let registry = ContextRegistry::new();
/// let mut ctx = ExecutionContext::builder(Strategy::Parallel)
///     .invocation(Invocation::from_process())
///     .registry(&registry)
///     .build();
/// ```
pub struct ContextBuilder {
    strategy: Strategy,
    invocation: Invocation,
    registry: Option<ContextRegistry>,
    options: ExecutionOptions,
}

impl ContextBuilder {
    pub fn invocation(mut self, invocation: Invocation) -> Self {
        self.invocation = invocation;
        self
    }

    /// Register the built context for emergency shutdown.
    pub fn registry(mut self, registry: &ContextRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> ExecutionContext {
        let shared = Arc::new(ContextShared::new(ContextId::generate(), self.invocation));
        if let Some(registry) = &self.registry {
            registry.register(&shared);
        }
        debug!(context = %shared.id(), strategy = %self.strategy, "context created");
        ExecutionContext {
            shared,
            strategy: self.strategy,
            chain: CallbackChain::new(),
            options: self.options,
            registry: self.registry,
            background: Vec::new(),
        }
    }
}

pub struct ExecutionContext {
    shared: Arc<ContextShared>,
    strategy: Strategy,
    chain: CallbackChain,
    options: ExecutionOptions,
    registry: Option<ContextRegistry>,
    background: Vec<JoinHandle<()>>,
}

impl ExecutionContext {
    pub fn builder(strategy: Strategy) -> ContextBuilder {
        ContextBuilder {
            strategy,
            invocation: Invocation::default(),
            registry: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn new(strategy: Strategy) -> Self {
        Self::builder(strategy).build()
    }

    pub fn with_invocation(strategy: Strategy, invocation: Invocation) -> Self {
        Self::builder(strategy).invocation(invocation).build()
    }

    /// Builder pre-filled with the strategy and options of `config`.
    pub fn from_config(config: &EngineConfig) -> ContextBuilder {
        Self::builder(config.strategy).options(config.execution_options())
    }

    pub fn id(&self) -> ContextId {
        self.shared.id()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn state(&self) -> ExecutionState {
        self.shared.state()
    }

    pub fn is_completed(&self) -> bool {
        self.shared.is_completed()
    }

    pub fn handle(&self) -> ContextHandle {
        ContextHandle::from_shared(Arc::clone(&self.shared))
    }

    pub fn chain(&self) -> &CallbackChain {
        &self.chain
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn results(&self) -> Vec<CallbackResult> {
        self.chain.results()
    }

    pub fn active_count(&self) -> usize {
        self.shared.active_count()
    }

    pub fn invocation(&self) -> Arc<Invocation> {
        self.shared.invocation()
    }

    pub fn set_invocation(&mut self, invocation: Invocation) -> &mut Self {
        *self.shared.invocation.write() = Arc::new(invocation);
        self
    }

    pub fn subscribe<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&Invocation, &ContextHandle) -> CallbackOutcome + Send + Sync + 'static,
    {
        self.chain.append(Arc::new(callback));
        self
    }

    pub fn subscribe_handler(&mut self, callback: Arc<dyn Callback>) -> &mut Self {
        self.chain.append(callback);
        self
    }

    pub fn subscribe_with_data<F>(&mut self, callback: F, data: Payload) -> &mut Self
    where
        F: Fn(&Invocation, &ContextHandle) -> CallbackOutcome + Send + Sync + 'static,
    {
        self.chain.append_with_data(Arc::new(callback), data);
        self
    }

    /// Adds `transform` to the chain.
    ///
    /// Known limitation: there is no transform step. This is exactly
    /// `subscribe`; the callback runs in sequence like any other and nothing
    /// is passed from one callback to the next.
    pub fn map<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(&Invocation, &ContextHandle) -> CallbackOutcome + Send + Sync + 'static,
    {
        self.subscribe(transform)
    }

    /// Guard every callback subscribed so far with `predicate`.
    ///
    /// At execution time a guarded callback whose predicate rejects the
    /// invocation snapshot is not invoked; its result becomes `Skipped`.
    /// Callbacks subscribed after this call are not affected.
    pub fn filter<P>(&mut self, predicate: P) -> &mut Self
    where
        P: Fn(&Invocation) -> bool + Send + Sync + 'static,
    {
        let guard: Guard = Arc::new(predicate);
        self.chain.guard_all(guard);
        self
    }

    /// Move `other`'s chain to the tail of this one, leaving `other` empty.
    ///
    /// A donor that has already completed keeps its chain: its records have
    /// run (or were abandoned) and must not run a second time here.
    pub fn merge_with(&mut self, other: &mut ExecutionContext) -> &mut Self {
        if other.chain.is_empty() {
            return self;
        }
        if other.is_completed() {
            debug!(
                context = %self.id(),
                donor = %other.id(),
                "donor already completed; merge ignored"
            );
            return self;
        }
        debug!(
            context = %self.id(),
            donor = %other.id(),
            moved = other.chain.len(),
            "merging chains"
        );
        other.chain.transfer_to(&mut self.chain);
        self
    }

    /// Only meaningful before `execute`.
    pub fn switch_strategy(&mut self, strategy: Strategy) -> &mut Self {
        self.strategy = strategy;
        self
    }

    pub fn on_next<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Invocation) + Send + Sync + 'static,
    {
        self.shared.hooks.write().on_next = Some(Arc::new(hook));
        self
    }

    pub fn on_complete<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Invocation, &ExecutionReport) + Send + Sync + 'static,
    {
        self.shared.hooks.write().on_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Invocation, &AbortReason) + Send + Sync + 'static,
    {
        self.shared.hooks.write().on_error = Some(Arc::new(hook));
        self
    }

    /// Run the chain under the current strategy.
    ///
    /// Blocks until the strategy has finished driving the chain (for Race,
    /// until the first worker reported). Returns `None` without running
    /// anything if the context has already completed.
    pub fn execute(&mut self) -> Option<ExecutionReport> {
        if self.shared.is_completed() {
            debug!(context = %self.id(), "execute on a completed context is a no-op");
            return None;
        }
        let (report, stragglers) =
            executor::execute(&self.shared, &self.chain, self.strategy, &self.options);
        self.background.extend(stragglers);
        Some(report)
    }

    /// Force completion and fire `on_error`.
    ///
    /// This is a signal, not a cancellation: worker threads already running
    /// keep running until their callbacks return. Returns false (and fires
    /// nothing) if the context had already completed.
    pub fn abort(&self) -> bool {
        self.shared.abort(AbortReason::Requested)
    }

    /// Number of worker threads left running by Race or a deadline expiry.
    pub fn background_count(&self) -> usize {
        self.background.iter().filter(|h| !h.is_finished()).count()
    }

    /// Join every worker thread left running by a previous `execute`.
    pub fn join_background(&mut self) {
        for handle in self.background.drain(..) {
            if handle.join().is_err() {
                warn!(context = %self.shared.id(), "background worker panicked");
            }
        }
    }
}

impl Drop for ExecutionContext {
    fn drop(&mut self) {
        if let Some(registry) = &self.registry {
            registry.unregister(self.shared.id());
        }
        let released = self.chain.release_all();
        debug!(context = %self.shared.id(), released, "context released");
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.shared.id())
            .field("strategy", &self.strategy)
            .field("state", &self.shared.state())
            .field("chain", &self.chain)
            .finish()
    }
}
