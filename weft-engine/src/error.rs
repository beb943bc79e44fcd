//! Error types for the engine

use thiserror::Error;

pub use crate::gateway::GatewayError;
pub use crate::repository::RepositoryError;
pub use crate::retarder::RetarderError;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced to callers of the engine's public operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// No run with this id exists
    #[error("pipeline run {0} not exists")]
    RunNotFound(i64),

    /// No stored pipeline with this name exists
    #[error("pipeline {0} not exists")]
    PipelineNotFound(String),

    /// The run already reached `Finish` or `Kill`
    #[error("pipeline run {0} is already finished")]
    RunTerminal(i64),

    /// The work queue was closed by shutdown
    #[error("work queue is closed")]
    QueueClosed,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("node executor error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("retarder error: {0}")]
    Retarder(#[from] RetarderError),
}

impl EngineError {
    /// Check if this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::RunNotFound(_) | Self::PipelineNotFound(_))
    }
}
