//! Node executor DTOs
//!
//! Wire format of one step invocation: the engine POSTs a [`NodeRequest`] to
//! an executor and reads back a [`NodeResult`]. Request field names are
//! capitalized to stay compatible with existing executors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::pipeline::KeyAndValue;

/// Annotation carrying the pipeline run id
pub const ANNOTATION_RUN_ID: &str = "database.pipelineRun/id";

/// Annotation carrying the node name
pub const ANNOTATION_NODE_NAME: &str = "database.pipelineRunNode/name";

/// Invocation of one step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRequest {
    /// Resolved parameters
    #[serde(rename = "Params", default)]
    pub params: Vec<KeyAndValue>,

    #[serde(rename = "Metadata", default)]
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(rename = "Annotations", default)]
    pub annotations: BTreeMap<String, String>,
}

impl NodeRequest {
    /// Builds a request for node `node_name` of run `run_id`.
    pub fn new(run_id: i64, node_name: &str, params: Vec<KeyAndValue>) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(ANNOTATION_RUN_ID.to_string(), run_id.to_string());
        annotations.insert(ANNOTATION_NODE_NAME.to_string(), node_name.to_string());
        Self {
            params,
            metadata: NodeMetadata { annotations },
        }
    }

    pub fn run_id(&self) -> Option<i64> {
        self.metadata
            .annotations
            .get(ANNOTATION_RUN_ID)
            .and_then(|id| id.parse().ok())
    }

    pub fn node_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .get(ANNOTATION_NODE_NAME)
            .map(String::as_str)
    }
}

/// Outcome reported by an executor
///
/// `status` is free-form on the wire; see
/// [`crate::domain::NodeStatus::from_reported`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub out: Vec<KeyAndValue>,

    /// Updates merged into the run's communal variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communal: Vec<KeyAndValue>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl NodeResult {
    pub fn finished() -> Self {
        Self {
            status: "Finish".to_string(),
            ..Self::default()
        }
    }

    pub fn killed(message: impl Into<String>) -> Self {
        Self {
            status: "Kill".to_string(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// A result that leaves the step open, e.g. awaiting a human decision
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            status: "Pending".to_string(),
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_out(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.out.push(KeyAndValue::new(key, value));
        self
    }

    pub fn with_communal(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.communal.push(KeyAndValue::new(key, value));
        self
    }
}
