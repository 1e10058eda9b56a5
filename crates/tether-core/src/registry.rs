//! Process-wide registry of live contexts, used for emergency shutdown.
//!
//! Entries are weak: the registry never keeps a context alive, and a context
//! removes itself on drop. The single mutex is held for the whole of every
//! mutation and for the whole `abort_all` scan.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::context::ContextShared;
use crate::domain::{AbortReason, ContextId};

struct Entry {
    id: ContextId,
    context: Weak<ContextShared>,
}

/// Cloneable handle to one registry. Clones share the same entries.
#[derive(Clone, Default)]
pub struct ContextRegistry {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, context: &Arc<ContextShared>) {
        let mut entries = self.entries.lock();
        entries.push(Entry {
            id: context.id(),
            context: Arc::downgrade(context),
        });
        debug!(context = %context.id(), registered = entries.len(), "context registered");
    }

    /// Remove `id`, preserving the order of the other entries.
    ///
    /// Returns false if it was not registered.
    pub fn unregister(&self, id: ContextId) -> bool {
        let mut entries = self.entries.lock();
        match entries.iter().position(|entry| entry.id == id) {
            Some(at) => {
                entries.remove(at);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.entries.lock().iter().any(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Abort every registered context that has not completed, then clear the
    /// registry.
    ///
    /// The lock is held for the entire scan, including the `on_error` hooks
    /// of the aborted contexts. Those hooks must not call back into this
    /// registry (or drop a registered context) or the calling thread
    /// deadlocks. Returns how many contexts were aborted.
    pub fn abort_all(&self, reason: AbortReason) -> usize {
        let mut entries = self.entries.lock();
        let mut aborted = 0;
        for entry in entries.iter() {
            let Some(context) = entry.context.upgrade() else {
                continue;
            };
            if !context.is_completed() && context.abort(reason.clone()) {
                aborted += 1;
            }
        }
        let scanned = entries.len();
        entries.clear();
        info!(%reason, scanned, aborted, "registry abort pass finished");
        aborted
    }

    /// Forget every entry without touching the contexts.
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock();
        debug!(dropped = entries.len(), "registry shut down");
        entries.clear();
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;
    use crate::context::ExecutionContext;
    use crate::domain::Strategy;

    fn registered(registry: &ContextRegistry) -> ExecutionContext {
        ExecutionContext::builder(Strategy::Sequential)
            .registry(registry)
            .build()
    }

    #[test]
    fn build_registers_and_drop_unregisters() {
        let registry = ContextRegistry::new();
        let a = registered(&registry);
        let b = registered(&registry);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(a.id()));

        let gone = a.id();
        drop(a);

        assert_eq!(registry.len(), 1);
        assert!(!registry.contains(gone));
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn unregister_reports_missing_ids() {
        let registry = ContextRegistry::new();
        let ctx = registered(&registry);

        assert!(registry.unregister(ctx.id()));
        assert!(!registry.unregister(ctx.id()));
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_keeps_order_of_the_rest() {
        let registry = ContextRegistry::new();
        let contexts: Vec<_> = (0..4).map(|_| registered(&registry)).collect();

        registry.unregister(contexts[1].id());

        let ids: Vec<_> = registry.entries.lock().iter().map(|e| e.id).collect();
        assert_eq!(
            ids,
            vec![contexts[0].id(), contexts[2].id(), contexts[3].id()]
        );
    }

    #[test]
    fn abort_all_fires_only_for_incomplete_contexts() {
        let registry = ContextRegistry::new();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let completes = Arc::new(AtomicUsize::new(0));

        let mut done = registered(&registry);
        let mut pending = registered(&registry);
        for ctx in [&mut done, &mut pending] {
            let reasons = Arc::clone(&reasons);
            let completes = Arc::clone(&completes);
            ctx.on_error(move |_, reason| reasons.lock().push(reason.clone()))
                .on_complete(move |_, _| {
                    completes.fetch_add(1, Ordering::SeqCst);
                });
        }
        done.execute();

        let aborted = registry.abort_all(AbortReason::Signal { signal: 15 });

        assert_eq!(aborted, 1);
        assert_eq!(*reasons.lock(), vec![AbortReason::Signal { signal: 15 }]);
        assert_eq!(completes.load(Ordering::SeqCst), 1);
        assert!(pending.is_completed());
        assert!(registry.is_empty());
        // contexts survive the pass; only the registry forgets them
        assert_eq!(pending.execute(), None);
    }

    #[test]
    fn abort_all_twice_is_harmless() {
        let registry = ContextRegistry::new();
        let _ctx = registered(&registry);

        assert_eq!(registry.abort_all(AbortReason::Requested), 1);
        assert_eq!(registry.abort_all(AbortReason::Requested), 0);
    }

    #[test]
    fn shutdown_clears_without_aborting() {
        let registry = ContextRegistry::new();
        let ctx = registered(&registry);

        registry.shutdown();

        assert!(registry.is_empty());
        assert!(!ctx.is_completed());
    }

    #[test]
    fn clones_share_entries() {
        let registry = ContextRegistry::new();
        let other = registry.clone();
        let _ctx = registered(&other);

        assert_eq!(registry.len(), 1);
    }
}
