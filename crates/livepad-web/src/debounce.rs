use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

/// Coalesces bursts of edits into one rebuild per quiet period.
///
/// A single task owns the pending snapshot and the rebuild callback, so
/// rebuilds for one editor never overlap. Each rebuild runs on the blocking
/// pool; the task itself never blocks. Dropping every handle flushes the
/// pending snapshot (if any) and ends the task.
#[derive(Debug, Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<String>,
}

impl Debouncer {
    /// Spawns the scheduling task on the current tokio runtime.
    pub fn spawn<F>(quiet: Duration, rebuild: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce_loop(rx, quiet, Arc::new(rebuild)));
        Self { tx }
    }

    /// Supersedes any pending snapshot. Returns `false` once the task is gone.
    pub fn schedule(&self, snapshot: impl Into<String>) -> bool {
        self.tx.send(snapshot.into()).is_ok()
    }
}

async fn debounce_loop<F>(
    mut rx: mpsc::UnboundedReceiver<String>,
    quiet: Duration,
    rebuild: Arc<F>,
) where
    F: Fn(&str) + Send + Sync + 'static,
{
    let mut last_built: Option<String> = None;

    while let Some(mut latest) = rx.recv().await {
        let sleep = tokio::time::sleep_until(Instant::now() + quiet);
        tokio::pin!(sleep);
        let mut superseded = 0usize;

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                next = rx.recv() => match next {
                    Some(snapshot) => {
                        latest = snapshot;
                        superseded += 1;
                        sleep.as_mut().reset(Instant::now() + quiet);
                    }
                    None => break,
                }
            }
        }

        if last_built.as_deref() == Some(latest.as_str()) {
            debug!(superseded, "snapshot unchanged, skipping rebuild");
            continue;
        }

        debug!(superseded, bytes = latest.len(), "rebuilding after quiet period");
        let task = Arc::clone(&rebuild);
        let snapshot = latest.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || task(&snapshot)).await {
            warn!(error = %err, "rebuild task failed");
        }
        last_built = Some(latest);
    }
}
