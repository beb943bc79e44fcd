//! Worker pool draining the run queue

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Runner;

/// Spawns `parallel` workers that take run ids off `rx` and advance them
/// until `cancel` fires or the queue closes.
///
/// Each `advance` runs in its own task so a panic is contained to that one
/// delivery and the worker keeps serving the queue.
pub fn spawn_workers(
    runner: Arc<Runner>,
    rx: mpsc::Receiver<i64>,
    parallel: usize,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    info!(workers = parallel, "Starting pipeline run workers");

    (0..parallel)
        .map(|worker| {
            tokio::spawn(work(
                worker,
                Arc::clone(&runner),
                Arc::clone(&rx),
                cancel.clone(),
            ))
        })
        .collect()
}

async fn work(
    worker: usize,
    runner: Arc<Runner>,
    rx: Arc<Mutex<mpsc::Receiver<i64>>>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = async { rx.lock().await.recv().await } => next,
        };
        let Some(run_id) = next else {
            debug!(worker, "Work queue closed");
            break;
        };

        let runner = Arc::clone(&runner);
        match tokio::spawn(async move { runner.advance(run_id).await }).await {
            Ok(Ok(outcome)) => debug!(worker, run_id, ?outcome, "Delivery handled"),
            Ok(Err(e)) => error!(worker, run_id, error = %e, "Failed to advance pipeline run"),
            Err(e) if e.is_panic() => error!(worker, run_id, "Advancing pipeline run panicked"),
            Err(e) => warn!(worker, run_id, error = %e, "Advance task cancelled"),
        }
    }
    debug!(worker, "Worker stopped");
}
