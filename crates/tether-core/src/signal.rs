//! Termination-signal bridge (Unix only).
//!
//! SIGINT, SIGTERM and SIGABRT are received on a dedicated thread running
//! a single-threaded tokio runtime. On receipt the thread aborts every
//! registered context, restores the default disposition and re-raises the
//! signal, so the process still dies the way the OS would have killed it.
//! Running the cleanup on an ordinary thread (rather than inside an async
//! signal handler) is what makes taking the registry mutex safe.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam::channel;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{info, warn};

use crate::domain::AbortReason;
use crate::error::TetherError;
use crate::registry::ContextRegistry;

static INSTALLED: AtomicBool = AtomicBool::new(false);

const THREAD_NAME: &str = "tether-signal";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Installation {
    Installed,
    /// A bridge was already running; the call changed nothing.
    AlreadyInstalled,
}

pub struct SignalBridge;

impl SignalBridge {
    /// Install the bridge for `registry`. At most one bridge per process.
    pub fn install(registry: ContextRegistry) -> Result<Installation, TetherError> {
        if INSTALLED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(Installation::AlreadyInstalled);
        }

        let (ready_tx, ready_rx) = channel::bounded::<Result<(), String>>(1);
        let spawned = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || listen(registry, ready_tx));

        if let Err(source) = spawned {
            INSTALLED.store(false, Ordering::Release);
            return Err(TetherError::Spawn {
                name: THREAD_NAME.to_string(),
                source,
            });
        }

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("signal bridge installed");
                Ok(Installation::Installed)
            }
            Ok(Err(message)) => {
                INSTALLED.store(false, Ordering::Release);
                Err(TetherError::SignalBridge(message))
            }
            Err(_) => {
                INSTALLED.store(false, Ordering::Release);
                Err(TetherError::SignalBridge(
                    "listener thread exited during setup".to_string(),
                ))
            }
        }
    }

    pub fn is_installed() -> bool {
        INSTALLED.load(Ordering::Acquire)
    }
}

fn listen(registry: ContextRegistry, ready: channel::Sender<Result<(), String>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(format!("runtime: {e}")));
            return;
        }
    };

    runtime.block_on(async move {
        let streams = (|| -> std::io::Result<(Signal, Signal, Signal)> {
            Ok((
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::from_raw(libc::SIGABRT))?,
            ))
        })();
        let (mut int, mut term, mut abrt) = match streams {
            Ok(s) => s,
            Err(e) => {
                let _ = ready.send(Err(format!("register handlers: {e}")));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let signo = tokio::select! {
            _ = int.recv() => libc::SIGINT,
            _ = term.recv() => libc::SIGTERM,
            _ = abrt.recv() => libc::SIGABRT,
        };

        let _ = writeln!(
            std::io::stderr(),
            "tether: caught signal {signo}, aborting {} live context(s)",
            registry.len()
        );
        warn!(signal = signo, "termination signal received");
        registry.abort_all(AbortReason::Signal { signal: signo });

        // SAFETY: restoring the default disposition and raising a standard
        // termination signal on our own process has no memory-safety
        // preconditions; the process is expected to terminate here.
        unsafe {
            libc::signal(signo, libc::SIG_DFL);
            libc::raise(signo);
        }
    });
}
