//! Callback chain: the ordered records a context executes.
//!
//! Records live in a `Vec` (arena-style); order is insertion order and new
//! subscriptions always land at the tail. Each record's result sits behind an
//! `Arc` so a worker thread that outlives the driving call (Race losers,
//! deadline stragglers) can still settle it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::callback::{self, Callback, Guard};
use crate::domain::{CallbackResult, Invocation};
use crate::error::CallbackError;

/// Owned, type-erased payload attached to a record.
pub type Payload = Box<dyn Any + Send + Sync>;

/// Result slot of one record. Starts Pending and settles at most once.
#[derive(Debug, Default)]
pub(crate) struct ResultCell(AtomicU8);

impl ResultCell {
    pub(crate) fn get(&self) -> CallbackResult {
        CallbackResult::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Pending -> `result`. Returns false if the record had already settled.
    pub(crate) fn settle(&self, result: CallbackResult) -> bool {
        debug_assert!(result.is_terminal());
        self.0
            .compare_exchange(
                CallbackResult::Pending.to_u8(),
                result.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

pub struct CallbackRecord {
    callback: Arc<dyn Callback>,
    result: Arc<ResultCell>,
    data: Option<Payload>,
    guards: Vec<Guard>,
}

impl CallbackRecord {
    fn new(callback: Arc<dyn Callback>, data: Option<Payload>) -> Self {
        Self {
            callback,
            result: Arc::new(ResultCell::default()),
            data,
            guards: Vec::new(),
        }
    }

    pub fn result(&self) -> CallbackResult {
        self.result.get()
    }

    pub fn data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.data.as_deref()
    }

    /// Payload downcast to `T`, if present and of that type.
    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.as_ref().and_then(|d| d.downcast_ref::<T>())
    }

    pub fn guard_count(&self) -> usize {
        self.guards.len()
    }

    pub(crate) fn callback(&self) -> &Arc<dyn Callback> {
        &self.callback
    }

    pub(crate) fn cell(&self) -> &Arc<ResultCell> {
        &self.result
    }

    pub(crate) fn settle(&self, result: CallbackResult) -> bool {
        self.result.settle(result)
    }

    pub(crate) fn admits(&self, invocation: &Invocation) -> Result<bool, CallbackError> {
        callback::admits(&self.guards, invocation)
    }
}

impl fmt::Debug for CallbackRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRecord")
            .field("result", &self.result())
            .field("has_data", &self.data.is_some())
            .field("guards", &self.guards.len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CallbackChain {
    records: Vec<CallbackRecord>,
}

impl CallbackChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a Pending record at the tail.
    pub fn append(&mut self, callback: Arc<dyn Callback>) {
        self.records.push(CallbackRecord::new(callback, None));
    }

    pub fn append_with_data(&mut self, callback: Arc<dyn Callback>, data: Payload) {
        self.records.push(CallbackRecord::new(callback, Some(data)));
    }

    /// Move every record to the tail of `other`, leaving `self` empty.
    ///
    /// Ownership moves; nothing is copied, so a record can never run from two
    /// chains.
    pub fn transfer_to(&mut self, other: &mut CallbackChain) {
        other.records.append(&mut self.records);
    }

    /// Attach `guard` to every record currently in the chain.
    pub fn guard_all(&mut self, guard: Guard) {
        for record in &mut self.records {
            record.guards.push(Arc::clone(&guard));
        }
    }

    /// Release every record (and its payload). Returns how many were released.
    pub fn release_all(&mut self) -> usize {
        let released = self.records.len();
        self.records.clear();
        released
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&CallbackRecord> {
        self.records.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallbackRecord> {
        self.records.iter()
    }

    /// Snapshot of every record's result, in chain order.
    pub fn results(&self) -> Vec<CallbackResult> {
        self.records.iter().map(CallbackRecord::result).collect()
    }

    /// Settle every still-Pending record from `start` onwards as `result`.
    pub(crate) fn settle_pending_from(&self, start: usize, result: CallbackResult) {
        for record in self.records.iter().skip(start) {
            record.settle(result);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::CallbackOutcome;
    use crate::context::ContextHandle;

    fn noop() -> Arc<dyn Callback> {
        Arc::new(|_: &Invocation, _: &ContextHandle| -> CallbackOutcome { Ok(()) })
    }

    #[test]
    fn append_keeps_insertion_order_and_starts_pending() {
        let mut chain = CallbackChain::new();
        chain.append(noop());
        chain.append_with_data(noop(), Box::new(7_u32));
        chain.append(noop());

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.results(), vec![CallbackResult::Pending; 3]);
        assert_eq!(chain.get(1).and_then(|r| r.data_as::<u32>()), Some(&7));
        assert!(chain.get(0).and_then(|r| r.data()).is_none());
        assert!(chain.get(1).and_then(|r| r.data_as::<String>()).is_none());
    }

    #[test]
    fn transfer_moves_records_and_empties_source() {
        let mut recipient = CallbackChain::new();
        recipient.append(noop());
        let mut donor = CallbackChain::new();
        donor.append_with_data(noop(), Box::new("donor"));
        donor.append(noop());

        donor.transfer_to(&mut recipient);

        assert!(donor.is_empty());
        assert_eq!(recipient.len(), 3);
        assert_eq!(recipient.get(1).and_then(|r| r.data_as::<&str>()), Some(&"donor"));
    }

    #[test]
    fn results_settle_only_once() {
        let mut chain = CallbackChain::new();
        chain.append(noop());
        let record = chain.get(0).unwrap();

        assert!(record.settle(CallbackResult::Success));
        assert!(!record.settle(CallbackResult::Error));
        assert_eq!(record.result(), CallbackResult::Success);
    }

    #[test]
    fn settle_pending_from_leaves_settled_records_alone() {
        let mut chain = CallbackChain::new();
        for _ in 0..4 {
            chain.append(noop());
        }
        chain.get(2).unwrap().settle(CallbackResult::Success);

        chain.settle_pending_from(1, CallbackResult::Error);

        assert_eq!(
            chain.results(),
            vec![
                CallbackResult::Pending,
                CallbackResult::Error,
                CallbackResult::Success,
                CallbackResult::Error,
            ]
        );
    }

    #[test]
    fn guard_all_only_touches_existing_records() {
        let mut chain = CallbackChain::new();
        chain.append(noop());
        chain.guard_all(Arc::new(|_: &Invocation| false));
        chain.append(noop());

        let inv = Invocation::default();
        assert_eq!(chain.get(0).unwrap().guard_count(), 1);
        assert!(!chain.get(0).unwrap().admits(&inv).unwrap());
        assert!(chain.get(1).unwrap().admits(&inv).unwrap());
    }

    #[test]
    fn release_all_drops_payloads() {
        let payload = Arc::new(());
        let mut chain = CallbackChain::new();
        chain.append_with_data(noop(), Box::new(Arc::clone(&payload)));
        chain.append(noop());
        assert_eq!(Arc::strong_count(&payload), 2);

        assert_eq!(chain.release_all(), 2);
        assert!(chain.is_empty());
        assert_eq!(Arc::strong_count(&payload), 1);
    }
}
