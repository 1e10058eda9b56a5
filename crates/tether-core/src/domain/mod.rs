//! Domain model: ids, strategies, states, the invocation snapshot and the
//! execution report.
//!
//! Nothing in here knows about threads or locks.

pub mod ids;
pub mod invocation;
pub mod report;
pub mod state;
pub mod strategy;

pub use ids::ContextId;
pub use invocation::Invocation;
pub use report::{AbortReason, ExecutionReport, FailedCallback};
pub use state::{CallbackResult, ExecutionState};
pub use strategy::Strategy;
