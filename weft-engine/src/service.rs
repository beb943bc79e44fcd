//! PipelineRun service
//!
//! The operations callers use to start and resume runs. Both return as soon
//! as the run is persisted and queued; execution happens on the workers.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use weft_core::domain::pipeline::KeyAndValue;
use weft_core::domain::{Pipeline, PipelineRun};

use crate::error::{EngineError, Result};
use crate::repository::{PipelineRepository, PipelineRunRepository};
use crate::runner::RunQueue;

#[derive(Clone)]
pub struct PipelineRunService {
    pipelines: Arc<dyn PipelineRepository>,
    runs: Arc<dyn PipelineRunRepository>,
    queue: RunQueue,
}

impl PipelineRunService {
    pub fn new(
        pipelines: Arc<dyn PipelineRepository>,
        runs: Arc<dyn PipelineRunRepository>,
        queue: RunQueue,
    ) -> Self {
        Self {
            pipelines,
            runs,
            queue,
        }
    }

    /// Creates a run of the stored pipeline `pipeline_ref` and schedules it.
    pub async fn create_run(
        &self,
        pipeline_ref: &str,
        params: Vec<KeyAndValue>,
    ) -> Result<PipelineRun> {
        let pipeline = self
            .pipelines
            .get_by_name(pipeline_ref)
            .await?
            .ok_or_else(|| EngineError::PipelineNotFound(pipeline_ref.to_string()))?;

        self.create_run_inline(pipeline, params).await
    }

    /// Creates a run that embeds `pipeline` as given and schedules it.
    pub async fn create_run_inline(
        &self,
        pipeline: Pipeline,
        params: Vec<KeyAndValue>,
    ) -> Result<PipelineRun> {
        let run = self.runs.create(PipelineRun::new(pipeline, params)).await?;
        info!(run_id = run.id, pipeline = %run.pipeline.name, "Pipeline run created");

        self.queue.push(run.id).await?;
        Ok(run)
    }

    /// Schedules an existing run again, e.g. after an external action closed
    /// its open node.
    pub async fn trigger_run(&self, id: i64) -> Result<()> {
        let run = self.get(id).await?;
        if run.is_terminal() {
            return Err(EngineError::RunTerminal(id));
        }

        self.queue.push(id).await?;
        info!(run_id = id, "Pipeline run triggered");
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<PipelineRun> {
        self.runs
            .get(id)
            .await?
            .ok_or(EngineError::RunNotFound(id))
    }

    /// Re-queues every unfinished run after `delay`. Returns how many were
    /// found; the pushes happen in the background.
    pub async fn recover(&self, delay: Duration) -> Result<usize> {
        let ids = self.runs.list_running().await?;
        let count = ids.len();
        if count == 0 {
            return Ok(0);
        }

        info!(runs = count, delay_secs = delay.as_secs(), "Recovering unfinished pipeline runs");
        let queue = self.queue.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for id in ids {
                if queue.push(id).await.is_err() {
                    warn!(run_id = id, "Work queue closed during recovery");
                    break;
                }
            }
        });

        Ok(count)
    }
}
