//! Engine assembly
//!
//! Wires the work queue, the retarder clock, the runner and the worker pool
//! together and starts them under one cancellation token.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::gateway::NodeGateway;
use crate::repository::PipelineRunRepository;
use crate::retarder::{Retarder, DEFAULT_BUFFER_SIZE};
use crate::runner::{self, RunQueue, Runner};

/// Runtime knobs for [`Engine::start`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Worker count
    pub parallel: usize,
    pub queue_capacity: usize,
    /// `None` disables delayed retries
    pub retarder: Option<RetarderSettings>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetarderSettings {
    pub buffer_size: usize,
    /// Seconds before a failed run is re-queued
    pub delay: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            parallel: 4,
            queue_capacity: runner::DEFAULT_CAPACITY,
            retarder: Some(RetarderSettings::default()),
        }
    }
}

impl Default for RetarderSettings {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            delay: 5,
        }
    }
}

/// Running engine
pub struct Engine {
    queue: RunQueue,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Starts the retarder clock and the workers. Everything stops when
    /// `cancel` fires; in-flight advances are not awaited.
    pub fn start(
        runs: Arc<dyn PipelineRunRepository>,
        gateway: Arc<NodeGateway>,
        settings: &EngineSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (queue, rx) = runner::channel(settings.queue_capacity);
        let mut tasks = Vec::new();

        let mut engine_runner = Runner::new(runs, gateway, queue.clone());
        if let Some(retry) = settings.retarder {
            let requeue = queue.clone();
            let retarder = Arc::new(Retarder::new(retry.buffer_size, move |run_id| {
                requeue.push_detached(run_id)
            }));
            tasks.push(tokio::spawn(Arc::clone(&retarder).run(cancel.clone())));
            engine_runner = engine_runner.with_retarder(retarder, retry.delay);
        }

        tasks.extend(runner::spawn_workers(
            Arc::new(engine_runner),
            rx,
            settings.parallel.max(1),
            cancel,
        ));

        info!(
            parallel = settings.parallel,
            queue_capacity = settings.queue_capacity,
            retarder = settings.retarder.is_some(),
            "Pipeline run engine started"
        );

        Self { queue, tasks }
    }

    /// Producer handle for scheduling runs
    pub fn queue(&self) -> RunQueue {
        self.queue.clone()
    }

    /// Waits for the clock and every worker to exit after cancellation.
    pub async fn join(self) {
        for task in self.tasks {
            match task.await {
                Ok(()) => {}
                Err(e) if e.is_panic() => error!("Engine task panicked during shutdown"),
                Err(e) => warn!(error = %e, "Engine task cancelled during shutdown"),
            }
        }
    }
}
