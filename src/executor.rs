use std::io::{self, Write as _};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::watcher::event::ChangeEvent;

/// Characters that switch a single-token command to `sh -c` execution.
const SHELL_METACHARS: &[char] = &[';', '&', '|', '=', '$'];

/// How a supervised run ended.
enum RunEnd {
    /// The command exited (or never spawned); proceed to the quiet period.
    Completed,
    /// A new change arrived while the command ran; it was terminated and
    /// the change becomes the next trigger.
    Superseded(ChangeEvent),
    /// Shutdown; any live child has been terminated and reaped.
    Cancelled,
}

/// Consumes the event queue and turns changes into command runs.
///
/// Per trigger: wait out the settle delay (absorbing the burst a single
/// save produces), run the command to completion, then discard every
/// change seen during the quiet period so the command's own filesystem
/// side effects cannot re-trigger it. The executor task is the only owner
/// of the child handle; each exit path reaps it before another can be
/// spawned, so at most one command instance is ever alive.
pub struct Executor {
    config: Arc<Config>,
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        config: Arc<Config>,
        events: mpsc::Receiver<ChangeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            events,
            cancel,
        }
    }

    /// Drive the trigger loop until cancellation or until the queue closes.
    pub async fn run(mut self) {
        loop {
            // Idle: block on the next trigger.
            let trigger = tokio::select! {
                _ = self.cancel.cancelled() => return,
                ev = self.events.recv() => match ev {
                    Some(ev) => ev,
                    None => return,
                },
            };

            if !self.fire(trigger).await {
                return;
            }
        }
    }

    /// Settle, run (re-settling on supersession), then quiet down.
    /// Returns false when the pipeline should stop.
    async fn fire(&mut self, mut trigger: ChangeEvent) -> bool {
        loop {
            if self.config.verbose {
                eprintln!("[run] change: {} ({})", trigger.path.display(), trigger.kind);
            }

            // Settling: later events from the same burst are discarded.
            drain_for(&mut self.events, self.config.wait, &self.cancel).await;
            if self.cancel.is_cancelled() {
                return false;
            }

            match self.run_once().await {
                RunEnd::Superseded(ev) => {
                    trigger = ev;
                }
                RunEnd::Completed => break,
                RunEnd::Cancelled => return false,
            }
        }

        // Quieting: swallow our own side effects.
        drain_for(&mut self.events, self.config.quiet, &self.cancel).await;
        !self.cancel.is_cancelled()
    }

    /// Spawn the command and supervise it until exit, supersession, or
    /// cancellation. Every path out of here has reaped the child.
    async fn run_once(&mut self) -> RunEnd {
        if self.config.clear {
            clear_screen();
        }
        eprintln!("running {}", self.config.command.join(" "));

        let mut child = match build_command(&self.config.command).spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                eprintln!("warning: command not found: {}", self.config.command[0]);
                return RunEnd::Completed;
            }
            Err(err) => {
                eprintln!("warning: failed to run command: {err}");
                return RunEnd::Completed;
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => {
                terminate(&mut child).await;
                RunEnd::Cancelled
            }
            ev = self.events.recv() => {
                terminate(&mut child).await;
                match ev {
                    Some(ev) => RunEnd::Superseded(ev),
                    // Queue closed mid-run: the watch is gone, stop.
                    None => RunEnd::Cancelled,
                }
            }
            status = child.wait() => {
                match status {
                    Ok(status) if status.success() => {
                        if self.config.verbose {
                            eprintln!("[run] done");
                        }
                    }
                    Ok(status) => eprintln!("warning: command failed: {status}"),
                    Err(err) => eprintln!("warning: failed to wait on command: {err}"),
                }
                RunEnd::Completed
            }
        }
    }
}

/// Receive and discard events for `duration`. Returns when the duration
/// has fully elapsed, or earlier if the token fires or the queue closes.
/// Events seen here are dropped, not deferred.
pub async fn drain_for(
    events: &mut mpsc::Receiver<ChangeEvent>,
    duration: Duration,
    cancel: &CancellationToken,
) {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep_until(deadline) => return,
            ev = events.recv() => {
                if ev.is_none() {
                    return;
                }
            }
        }
    }
}

/// Kill and reap `child`. Idempotent: a child that already exited makes
/// the kill a no-op and the wait return immediately.
async fn terminate(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        // InvalidInput means the child was already reaped.
        if err.kind() != io::ErrorKind::InvalidInput {
            eprintln!("warning: failed to kill command: {err}");
        }
    }
    if let Err(err) = child.wait().await {
        eprintln!("warning: failed to reap command: {err}");
    }
}

/// Build the process invocation with inherited standard streams.
///
/// A single token containing shell metacharacters runs through `sh -c`, so
/// one-liners like `"make build && make test"` work without manual
/// splitting. The injection surface this opens is the documented trade-off.
fn build_command(argv: &[String]) -> Command {
    let mut cmd = if argv.len() == 1 && argv[0].contains(SHELL_METACHARS) {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&argv[0]);
        cmd
    } else {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd
    };
    cmd.kill_on_drop(true);
    cmd
}

fn clear_screen() {
    print!("\x1b[2J\x1b[1;1H");
    let _ = io::stdout().flush();
}
