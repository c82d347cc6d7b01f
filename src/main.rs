mod cli;
mod config;
mod executor;
mod filter;
mod watcher;

use std::sync::{Arc, PoisonError};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use config::Config;
use executor::Executor;
use watcher::event::ChangeEvent;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::resolve(cli)?);

    let cancel = CancellationToken::new();
    let pipeline =
        watcher::start(&config, cancel.clone()).context("failed to create filesystem watcher")?;

    let funnel = tokio::spawn(pipeline.funnel.run());
    let exec = tokio::spawn(Executor::new(config.clone(), pipeline.events, cancel.clone()).run());
    let _signals = tokio::spawn(shutdown_signal(cancel.clone()));

    // Register after the pipeline is live so no event arriving mid-walk is
    // lost. A failure here is fatal: better no watch than a partial one.
    let registration = pipeline
        .registrar
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .register_tree();
    if let Err(err) = registration {
        cancel.cancel();
        return Err(err.context("failed to register watch tree"));
    }

    if config.run_on_start {
        let _ = pipeline.injector.send(ChangeEvent::startup(&config.root)).await;
    }
    // The executor's end-of-stream now tracks the funnel alone.
    drop(pipeline.injector);

    // Nothing exits these until the token fires or the event source dies.
    let _ = funnel.await;
    let _ = exec.await;

    Ok(())
}

/// Cancel the token on the first termination signal. Cancellation is
/// idempotent, so a second signal while shutdown is in flight is harmless.
async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                eprintln!("warning: cannot install SIGTERM handler: {err}");
                return;
            }
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(int) => int,
            Err(err) => {
                eprintln!("warning: cannot install SIGINT handler: {err}");
                return;
            }
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    cancel.cancel();
}
