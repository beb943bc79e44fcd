//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{KeyAndValue, Pipeline};

/// Request to create or replace a pipeline template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePipeline {
    #[serde(flatten)]
    pub pipeline: Pipeline,
}

/// Request to start a run of a stored pipeline, by name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecPipeline {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyAndValue>,
}
