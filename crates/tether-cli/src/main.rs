//! tether: run the demo client, server and console chains.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tether_core::{ContextRegistry, ExecutionContext, Invocation, Strategy};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(about = "Run callback chains under a chosen execution strategy", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Strategy override (sequential, parallel, race, merge)
    #[arg(short, long, global = true)]
    strategy: Option<Strategy>,

    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print the execution report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// init, connect, process (sequential by default)
    Client,
    /// init, bind, listen, handle (parallel by default)
    Server,
    /// Echo one line of input through a single-callback chain
    Console { input: Option<String> },
}

impl Command {
    fn default_strategy(&self) -> Strategy {
        match self {
            Command::Server => Strategy::Parallel,
            Command::Client | Command::Console { .. } => Strategy::Sequential,
        }
    }
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "tether_core=info,tether=info",
            _ => "tether_core=debug,tether=debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(unix)]
fn install_signal_bridge(registry: &ContextRegistry) -> Result<()> {
    tether_core::SignalBridge::install(registry.clone())?;
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_bridge(_registry: &ContextRegistry) -> Result<()> {
    warn!("signal bridge is only available on unix");
    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = CliConfig::load(args.config.as_deref())?;
    let registry = ContextRegistry::new();

    if config.engine.install_signal_bridge {
        install_signal_bridge(&registry)?;
    }

    let strategy = config.resolve_strategy(args.strategy, args.command.default_strategy());

    let mut ctx = ExecutionContext::builder(strategy)
        .invocation(Invocation::from_process())
        .options(config.engine.execution_options())
        .registry(&registry)
        .build();

    match args.command {
        Command::Client => commands::client(&mut ctx),
        Command::Server => commands::server(&mut ctx, &config.server),
        Command::Console { input } => commands::console(&mut ctx, input),
    }

    info!(context = %ctx.id(), %strategy, callbacks = ctx.len(), "running");
    let report = ctx.execute();
    ctx.join_background();

    let Some(report) = report else {
        warn!("context completed before it could run");
        return Ok(ExitCode::FAILURE);
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let counts = report.counts();
        println!(
            "{} [{}] succeeded={} failed={} skipped={} pending={}",
            report.context, report.strategy, counts.succeeded, counts.failed, counts.skipped, counts.pending
        );
        if let Some(reason) = &report.aborted {
            println!("aborted: {reason}");
        }
    }

    match report.into_result() {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            warn!(kind = ?err.kind(), %err, "run failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
