//! Pipeline Service
//!
//! Business logic for pipeline templates.

use std::collections::HashSet;
use std::sync::Arc;
use weft_core::domain::pipeline::KeyAndValue;
use weft_core::domain::{Pipeline, PipelineRun};
use weft_engine::{EngineError, PipelineRepository, PipelineRunService, RepositoryError};

/// Service error type
#[derive(Debug)]
pub enum PipelineError {
    NotFound(String),
    ValidationError(String),
    Engine(EngineError),
}

impl From<EngineError> for PipelineError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::PipelineNotFound(name) => PipelineError::NotFound(name),
            other => PipelineError::Engine(other),
        }
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(err: RepositoryError) -> Self {
        PipelineError::Engine(err.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Clone)]
pub struct PipelineService {
    pipelines: Arc<dyn PipelineRepository>,
    runs: PipelineRunService,
}

impl PipelineService {
    pub fn new(pipelines: Arc<dyn PipelineRepository>, runs: PipelineRunService) -> Self {
        Self { pipelines, runs }
    }

    /// Creates the pipeline, or replaces the spec of the one with the same
    /// name. Runs already created keep their own copy.
    pub async fn save(&self, pipeline: Pipeline) -> Result<Pipeline> {
        validate_pipeline(&pipeline)?;

        if self.pipelines.save(&pipeline).await? {
            tracing::info!("Pipeline created: {}", pipeline.name);
        } else {
            tracing::info!("Pipeline updated: {}", pipeline.name);
        }

        Ok(pipeline)
    }

    pub async fn get(&self, name: &str) -> Result<Pipeline> {
        self.pipelines
            .get_by_name(name)
            .await?
            .ok_or_else(|| PipelineError::NotFound(name.to_string()))
    }

    /// Starts a run of the stored pipeline `name`.
    pub async fn exec(&self, name: &str, params: Vec<KeyAndValue>) -> Result<PipelineRun> {
        Ok(self.runs.create_run(name, params).await?)
    }
}

/// Rejects templates the runner cannot address unambiguously.
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<()> {
    if pipeline.name.trim().is_empty() {
        return Err(PipelineError::ValidationError(
            "Pipeline name cannot be empty".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for node in &pipeline.spec.nodes {
        if node.name.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "Node name cannot be empty".to_string(),
            ));
        }
        if !names.insert(node.name.as_str()) {
            return Err(PipelineError::ValidationError(format!(
                "Duplicate node name: {}",
                node.name
            )));
        }
    }

    Ok(())
}
