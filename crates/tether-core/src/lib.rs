//! tether-core
//!
//! Execution contexts: subscribe callbacks, pick a strategy, execute once.
//!
//! # Modules
//! - **domain**: ids, strategy, states, invocation snapshot, execution report
//! - **callback** / **chain**: the `Callback` trait and the ordered record chain
//! - **context**: `ExecutionContext` (builder, subscribe/filter/merge, hooks, execute)
//! - **executor**: Sequential / Parallel / Race / Merge
//! - **registry**: live contexts for emergency shutdown
//! - **signal**: SIGINT/SIGTERM/SIGABRT → `registry.abort_all` (Unix only)
//! - **config**: TOML-backed engine configuration
//! - **observability**: per-result counts
//! - **error**: `TetherError` / `CallbackError`
//!
//! ```ignore
//! let registry = ContextRegistry::new();
//! let mut ctx = ExecutionContext::builder(Strategy::Parallel)
//!     .invocation(Invocation::from_process())
//!     .registry(&registry)
//!     .build();
//! ctx.subscribe(|_, _| Ok(()))
//!     .on_complete(|_, report| println!("{:?}", report.counts()));
//! let report = ctx.execute();
//! ```

pub mod callback;
pub mod chain;
pub mod config;
pub mod context;
pub mod domain;
pub mod error;
mod executor;
pub mod observability;
pub mod registry;
#[cfg(unix)]
pub mod signal;

pub use callback::{Callback, CallbackOutcome, Guard};
pub use chain::{CallbackChain, CallbackRecord, Payload};
pub use config::{EngineConfig, ExecutionOptions};
pub use context::{ContextBuilder, ContextHandle, ExecutionContext};
pub use domain::{
    AbortReason, CallbackResult, ContextId, ExecutionReport, ExecutionState, FailedCallback,
    Invocation, Strategy,
};
pub use error::{CallbackError, ErrorKind, TetherError};
pub use observability::ChainCounts;
pub use registry::ContextRegistry;
#[cfg(unix)]
pub use signal::{Installation, SignalBridge};
