//! In-memory repositories
//!
//! Used by the engine tests and by embedded setups that accept losing every
//! run on restart.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use weft_core::domain::{Pipeline, PipelineRun, RunState};

use super::{PipelineRepository, PipelineRunRepository, RepositoryError};

#[derive(Debug, Default)]
pub struct InMemoryPipelineRepository {
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn create(&self, pipeline: &Pipeline) -> Result<(), RepositoryError> {
        self.pipelines
            .write()
            .await
            .insert(pipeline.name.clone(), pipeline.clone());
        Ok(())
    }

    async fn update(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError> {
        let mut pipelines = self.pipelines.write().await;
        match pipelines.get_mut(&pipeline.name) {
            Some(stored) => {
                stored.spec = pipeline.spec.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self.pipelines.read().await.get(name).cloned())
    }

    async fn save(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError> {
        let mut pipelines = self.pipelines.write().await;
        match pipelines.get_mut(&pipeline.name) {
            Some(stored) => {
                stored.spec = pipeline.spec.clone();
                Ok(false)
            }
            None => {
                pipelines.insert(pipeline.name.clone(), pipeline.clone());
                Ok(true)
            }
        }
    }
}

/// Runs keyed by id; ids start at 1
#[derive(Debug)]
pub struct InMemoryPipelineRunRepository {
    next_id: AtomicI64,
    runs: RwLock<BTreeMap<i64, PipelineRun>>,
}

impl InMemoryPipelineRunRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            runs: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryPipelineRunRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PipelineRunRepository for InMemoryPipelineRunRepository {
    async fn create(&self, mut run: PipelineRun) -> Result<PipelineRun, RepositoryError> {
        run.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        run.created_at = now;
        run.updated_at = now;
        self.runs.write().await.insert(run.id, run.clone());
        Ok(run)
    }

    async fn update(&self, run: &PipelineRun) -> Result<bool, RepositoryError> {
        let mut runs = self.runs.write().await;
        match runs.get_mut(&run.id) {
            Some(stored) => {
                *stored = run.clone();
                stored.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get(&self, id: i64) -> Result<Option<PipelineRun>, RepositoryError> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list_running(&self) -> Result<Vec<i64>, RepositoryError> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|run| run.state == RunState::Running)
            .map(|run| run.id)
            .collect())
    }
}
