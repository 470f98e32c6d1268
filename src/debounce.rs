//! Write coalescing for the save path.
//!
//! Rapid edits should not each hit the cache and network; the debouncer
//! collapses a burst into one save once the keyboard goes quiet, while
//! `flush` forces the pending save through immediately (week navigation,
//! sign-out, shutdown).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// The deferred save action. Captures whatever context the caller needs.
pub type SaveFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

enum Command {
    Edit,
    Flush(oneshot::Sender<()>),
}

/// Collapses bursts of edits into a single save after a quiet period.
pub struct SaveDebouncer {
    tx: mpsc::UnboundedSender<Command>,
}

impl SaveDebouncer {
    /// Spawn the debounce loop. `quiet` is how long input must be idle
    /// before a pending save fires on its own.
    pub fn spawn(quiet: Duration, save: SaveFn) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(rx, quiet, save));
        Self { tx }
    }

    /// Record an edit. Restarts the quiet-period timer.
    pub fn note_edit(&self) {
        // Loop task only exits when the sender is dropped.
        let _ = self.tx.send(Command::Edit);
    }

    /// Run any pending save now and wait for it to finish. A no-op when
    /// nothing is pending.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run(mut rx: mpsc::UnboundedReceiver<Command>, quiet: Duration, save: SaveFn) {
    let mut deadline: Option<Instant> = None;

    loop {
        let command = match deadline {
            Some(at) => {
                tokio::select! {
                    cmd = rx.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => {
                            // Owner dropped with a save pending; run it.
                            save().await;
                            return;
                        }
                    },
                    _ = sleep_until(at) => {
                        deadline = None;
                        save().await;
                        continue;
                    }
                }
            }
            None => match rx.recv().await {
                Some(cmd) => cmd,
                None => return,
            },
        };

        match command {
            Command::Edit => deadline = Some(Instant::now() + quiet),
            Command::Flush(done) => {
                if deadline.take().is_some() {
                    save().await;
                }
                let _ = done.send(());
            }
        }
    }
}
