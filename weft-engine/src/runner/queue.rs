//! Bounded work queue of run ids

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Default queue capacity
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Creates a queue handle and the receiving end the workers drain.
pub fn channel(capacity: usize) -> (RunQueue, mpsc::Receiver<i64>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (RunQueue { tx }, rx)
}

/// Producer handle for the work queue
#[derive(Debug, Clone)]
pub struct RunQueue {
    tx: mpsc::Sender<i64>,
}

impl RunQueue {
    /// Enqueues `run_id`, waiting for room when the queue is full.
    pub async fn push(&self, run_id: i64) -> Result<()> {
        self.tx
            .send(run_id)
            .await
            .map_err(|_| EngineError::QueueClosed)
    }

    /// Enqueues `run_id` without blocking the caller.
    ///
    /// Workers and the retarder clock use this: a worker that blocked on a
    /// full queue it is supposed to drain would never wake up. On a full
    /// queue the send moves to its own task.
    pub fn push_detached(&self, run_id: i64) {
        match self.tx.try_send(run_id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(run_id)) => {
                debug!(run_id, "Work queue full, deferring push");
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(run_id).await.is_err() {
                        warn!(run_id, "Work queue closed, run not re-queued");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(run_id)) => {
                warn!(run_id, "Work queue closed, run not re-queued");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
