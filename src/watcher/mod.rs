pub mod event;
pub mod registrar;

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::filter::IgnoreFilter;
use event::{ChangeEvent, ChangeKind};
use registrar::TreeRegistrar;

/// Capacity of the raw and filtered event queues.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// The watch pipeline's moving parts, handed to the lifecycle controller.
pub struct WatchPipeline {
    /// The funnel loop to spawn.
    pub funnel: EventFunnel,
    /// Shared with the funnel; the lifecycle performs the initial tree walk
    /// through it before any dynamic registration happens.
    pub registrar: Arc<Mutex<TreeRegistrar>>,
    /// Second sender on the filtered queue, for the synthetic startup event.
    pub injector: mpsc::Sender<ChangeEvent>,
    /// The filtered queue consumed by the executor.
    pub events: mpsc::Receiver<ChangeEvent>,
}

/// Create the OS watcher and wire the funnel around it.
///
/// The notify callback runs on notify's own thread; `blocking_send` applies
/// backpressure there, never on the async runtime.
pub fn start(config: &Config, cancel: CancellationToken) -> Result<WatchPipeline> {
    let (raw_tx, raw_rx) = mpsc::channel::<notify::Result<notify::Event>>(EVENT_QUEUE_CAPACITY);
    let watcher = notify::recommended_watcher(move |res| {
        let _ = raw_tx.blocking_send(res);
    })?;

    let registrar = Arc::new(Mutex::new(TreeRegistrar::new(
        watcher,
        config.root.clone(),
        config.depth,
        config.verbose,
    )));

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    let funnel = EventFunnel {
        raw_rx,
        registrar: registrar.clone(),
        filter: IgnoreFilter::new(config.root.clone(), &config.ignore),
        out: tx.clone(),
        cancel,
        verbose: config.verbose,
    };

    Ok(WatchPipeline {
        funnel,
        registrar,
        injector: tx,
        events: rx,
    })
}

/// Pumps raw notify results into the filtered queue.
///
/// Source errors are advisory: they are reported and the loop continues.
/// Directory-creation events grow the watch set before filtering, so a new
/// directory's contents are observed from then on. Dropping the output
/// sender on exit closes the queue, which the executor reads as
/// end-of-stream.
pub struct EventFunnel {
    raw_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    registrar: Arc<Mutex<TreeRegistrar>>,
    filter: IgnoreFilter,
    out: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
    verbose: bool,
}

impl EventFunnel {
    /// Run until cancellation or until the event source goes away.
    pub async fn run(mut self) {
        loop {
            let res = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = self.raw_rx.recv() => match res {
                    Some(res) => res,
                    None => break,
                },
            };

            match res {
                Ok(event) => {
                    if !self.handle_event(event).await {
                        break;
                    }
                }
                Err(err) => eprintln!("[watcher] error: {err}"),
            }
        }
    }

    /// Returns false when the pipeline is shutting down.
    async fn handle_event(&mut self, event: notify::Event) -> bool {
        let kind = ChangeKind::from(&event.kind);

        for path in event.paths {
            if kind == ChangeKind::Create && path.is_dir() {
                let registered = self
                    .registrar
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .register_one(&path);
                if let Err(err) = registered {
                    eprintln!("warning: failed to watch {}: {err}", path.display());
                }
            }

            if self.filter.should_ignore(&path) {
                if self.verbose {
                    eprintln!("[watcher] ignored {}", path.display());
                }
                continue;
            }

            if self.verbose {
                eprintln!("[watcher] {kind} {}", path.display());
            }

            let ev = ChangeEvent::new(kind, path);
            // A full queue must not wedge shutdown: the send races the token.
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                sent = self.out.send(ev) => {
                    if sent.is_err() {
                        return false;
                    }
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::time::timeout;

    fn test_config(root: PathBuf, ignore: &[&str]) -> Config {
        Config {
            root,
            depth: 1,
            ignore: ignore.iter().map(|p| p.to_string()).collect(),
            quiet: Duration::from_millis(100),
            wait: Duration::from_millis(10),
            verbose: false,
            clear: false,
            run_on_start: false,
            command: vec!["true".to_string()],
        }
    }

    async fn next_event(
        rx: &mut mpsc::Receiver<ChangeEvent>,
    ) -> Option<ChangeEvent> {
        timeout(Duration::from_secs(5), rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_funnel_delivers_events_and_applies_filter() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = test_config(root.clone(), &["*.tmp"]);
        let cancel = CancellationToken::new();

        let pipeline = start(&config, cancel.clone()).unwrap();
        pipeline
            .registrar
            .lock()
            .unwrap()
            .register_tree()
            .unwrap();
        let funnel = tokio::spawn(pipeline.funnel.run());
        let mut events = pipeline.events;
        drop(pipeline.injector);

        fs::write(root.join("scratch.tmp"), "ignored").unwrap();
        fs::write(root.join("kept.txt"), "delivered").unwrap();

        let mut saw_kept = false;
        while let Some(ev) = next_event(&mut events).await {
            assert!(
                !ev.path.to_string_lossy().ends_with(".tmp"),
                "ignored file leaked through the filter: {:?}",
                ev.path
            );
            if ev.path.ends_with("kept.txt") {
                saw_kept = true;
                break;
            }
        }
        assert!(saw_kept, "event for kept.txt never arrived");

        cancel.cancel();
        funnel.await.unwrap();
    }

    #[tokio::test]
    async fn test_funnel_watches_newly_created_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = test_config(root.clone(), &[]);
        let cancel = CancellationToken::new();

        let pipeline = start(&config, cancel.clone()).unwrap();
        pipeline
            .registrar
            .lock()
            .unwrap()
            .register_tree()
            .unwrap();
        let registrar = pipeline.registrar.clone();
        let funnel = tokio::spawn(pipeline.funnel.run());
        let mut events = pipeline.events;
        drop(pipeline.injector);

        let sub = root.join("fresh");
        fs::create_dir(&sub).unwrap();

        // The create event for the directory itself is delivered, and the
        // registration side effect happens before the event is forwarded.
        let ev = next_event(&mut events).await.expect("expected an event");
        assert!(ev.path.ends_with("fresh"));
        assert!(registrar.lock().unwrap().watched().contains(&sub));

        // Writes inside the new directory are observed.
        fs::write(sub.join("inner.txt"), "x").unwrap();
        let mut saw_inner = false;
        while let Some(ev) = next_event(&mut events).await {
            if ev.path.ends_with("inner.txt") {
                saw_inner = true;
                break;
            }
        }
        assert!(saw_inner, "change inside the new directory was not observed");

        cancel.cancel();
        funnel.await.unwrap();
    }

    #[tokio::test]
    async fn test_funnel_closes_queue_on_cancellation() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let config = test_config(root.clone(), &[]);
        let cancel = CancellationToken::new();

        let pipeline = start(&config, cancel.clone()).unwrap();
        let funnel = tokio::spawn(pipeline.funnel.run());
        let mut events = pipeline.events;
        drop(pipeline.injector);

        cancel.cancel();
        funnel.await.unwrap();

        assert!(
            next_event(&mut events).await.is_none(),
            "queue should be closed after the funnel exits"
        );
    }
}
