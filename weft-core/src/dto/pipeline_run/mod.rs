//! Pipeline run DTOs

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{KeyAndValue, Pipeline};

/// Request to create a run from an inline pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipelineRun {
    pub pipeline: Pipeline,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyAndValue>,
}

/// Request to (re-)schedule an existing run
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExecPipelineRun {
    pub id: i64,
}

/// Reply carrying the id of a created run
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelineRunCreated {
    pub id: i64,
}
