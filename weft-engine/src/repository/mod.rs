//! Repository Module
//!
//! Storage seams for pipelines and runs. The engine only talks to these
//! traits; the orchestrator provides PostgreSQL implementations and
//! [`memory`] provides in-process ones.

pub mod memory;

pub use memory::{InMemoryPipelineRepository, InMemoryPipelineRunRepository};

use async_trait::async_trait;
use thiserror::Error;
use weft_core::domain::{Pipeline, PipelineRun};

/// Storage failure
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("failed to (de)serialize stored document: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// Stored pipeline templates, keyed by name
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn create(&self, pipeline: &Pipeline) -> Result<(), RepositoryError>;

    /// Replaces the stored spec. Returns `false` if no pipeline has the name.
    async fn update(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Pipeline>, RepositoryError>;

    /// Creates the pipeline or replaces the spec of the one with the same
    /// name, atomically. Returns `true` if it was created.
    async fn save(&self, pipeline: &Pipeline) -> Result<bool, RepositoryError>;
}

/// Stored pipeline runs
#[async_trait]
pub trait PipelineRunRepository: Send + Sync {
    /// Persists a new run and returns it with its assigned id.
    async fn create(&self, run: PipelineRun) -> Result<PipelineRun, RepositoryError>;

    /// Writes the full snapshot and bumps `updated_at`. Returns `false` if
    /// the run does not exist.
    async fn update(&self, run: &PipelineRun) -> Result<bool, RepositoryError>;

    async fn get(&self, id: i64) -> Result<Option<PipelineRun>, RepositoryError>;

    /// Ids of every run still in `Running` state, oldest first
    async fn list_running(&self) -> Result<Vec<i64>, RepositoryError>;
}
