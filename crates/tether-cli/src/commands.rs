//! Demo chains: client middleware, server handlers, console reader.
//!
//! Each function only subscribes callbacks; `main` owns building and
//! executing the context.

use std::time::Duration;

use tether_core::{CallbackError, ExecutionContext};
use tracing::{debug, info};

use crate::config::ServerSettings;

/// init → connect → process.
pub fn client(ctx: &mut ExecutionContext) {
    ctx.subscribe(|inv, _| {
        info!(argc = inv.argc(), "client: init");
        Ok(())
    })
    .subscribe(|inv, _| {
        let endpoint = inv.env_var("TETHER_ENDPOINT").unwrap_or("localhost");
        info!(endpoint, "client: connect");
        Ok(())
    })
    .subscribe(|_, ctx| {
        info!(context = %ctx.id(), "client: process");
        Ok(())
    });
}

/// init, bind, listen and handle-request, meant to run concurrently.
///
/// The listen handler polls the completion flag between sleeps and gives up
/// after `max_iterations`, so an abort (or a Race winner) ends it early.
pub fn server(ctx: &mut ExecutionContext, settings: &ServerSettings) {
    let max_iterations = settings.max_iterations;
    let poll = Duration::from_millis(settings.poll_interval_ms);

    ctx.subscribe(|_, _| {
        info!("server: init");
        Ok(())
    })
    .subscribe(|_, _| {
        info!("server: bind");
        Ok(())
    })
    .subscribe(move |_, ctx| {
        for iteration in 1..=max_iterations {
            if ctx.is_completed() {
                debug!(iteration, "server: listen stopping, context completed");
                return Ok(());
            }
            debug!(iteration, "server: listening");
            std::thread::sleep(poll);
        }
        info!(max_iterations, "server: listen finished");
        Ok(())
    })
    .subscribe(|_, _| {
        info!("server: handle request");
        Ok(())
    });
}

/// One callback that echoes `input`, failing when there is none.
pub fn console(ctx: &mut ExecutionContext, input: Option<String>) {
    ctx.subscribe(move |_, _| match input.as_deref().map(str::trim) {
        Some(line) if !line.is_empty() => {
            println!("console: {line}");
            Ok(())
        }
        _ => Err(CallbackError::new("no console input")),
    });
}
