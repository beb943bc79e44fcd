//! Pipeline run domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::pipeline::{KeyAndValue, Pipeline};

/// One execution instance of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Assigned by the repository on creation
    pub id: i64,

    /// Frozen copy of the template taken at creation time
    pub pipeline: Pipeline,

    pub spec: PipelineRunSpec,
    pub status: PipelineRunStatus,

    /// Terminal marker kept consistent with `status.status`; indexed by
    /// storage for "list running" queries
    pub state: RunState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineRun {
    /// Creates an unsaved run (id 0) for `pipeline` with the given input
    /// overrides.
    pub fn new(pipeline: Pipeline, params: Vec<KeyAndValue>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            spec: PipelineRunSpec {
                params,
                communal: Vec::new(),
                pipeline_ref: pipeline.name.clone(),
            },
            pipeline,
            status: PipelineRunStatus::default(),
            state: RunState::Running,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The most recently appended node status, if any
    pub fn last_node(&self) -> Option<&NodeStatusSpec> {
        self.status.node_run.last()
    }

    pub fn last_node_mut(&mut self) -> Option<&mut NodeStatusSpec> {
        self.status.node_run.last_mut()
    }

    /// First status record named `name`
    pub fn node_status(&self, name: &str) -> Option<&NodeStatusSpec> {
        self.status.node_run.iter().find(|s| s.name == name)
    }
}

/// Run-specific input overrides layered over the pipeline's declarations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRunSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyAndValue>,

    /// Overrides, plus values written back by executors during the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communal: Vec<KeyAndValue>,

    #[serde(rename = "pipelineRef", default, skip_serializing_if = "String::is_empty")]
    pub pipeline_ref: String,
}

/// Observed state of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunStatus {
    #[serde(default)]
    pub status: RunState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    /// One entry per attempted node, append-only, in pipeline order
    #[serde(rename = "taskRun", default, skip_serializing_if = "Vec::is_empty")]
    pub node_run: Vec<NodeStatusSpec>,
}

/// Phase of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Running,
    Finish,
    Kill,
}

impl RunState {
    /// `Finish` and `Kill` are terminal; a terminal run is never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Finish | RunState::Kill)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "Running",
            RunState::Finish => "Finish",
            RunState::Kill => "Kill",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Running" => Some(RunState::Running),
            "Finish" => Some(RunState::Finish),
            "Kill" => Some(RunState::Kill),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one attempted node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Open: executing, awaiting external action, or awaiting a retry
    #[default]
    Pending,
    Finish,
    Skip,
    Kill,
}

impl NodeStatus {
    /// Maps a status reported by an executor. Anything other than `Finish`
    /// or `Kill` means the step is not complete yet.
    pub fn from_reported(status: &str) -> Self {
        match status {
            "Finish" => NodeStatus::Finish,
            "Kill" => NodeStatus::Kill,
            _ => NodeStatus::Pending,
        }
    }

    pub fn is_open(self) -> bool {
        self == NodeStatus::Pending
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "Pending"),
            NodeStatus::Finish => write!(f, "Finish"),
            NodeStatus::Skip => write!(f, "Skip"),
            NodeStatus::Kill => write!(f, "Kill"),
        }
    }
}

/// Runtime status record for one attempted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusSpec {
    /// Name of the node this record belongs to
    pub name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<KeyAndValue>,

    #[serde(default)]
    pub status: NodeStatus,

    #[serde(rename = "startTime")]
    pub start_time: DateTime<Utc>,

    #[serde(rename = "completionTime", default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl NodeStatusSpec {
    /// An open record for `name`, started now
    pub fn open(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: Vec::new(),
            status: NodeStatus::Pending,
            start_time: Utc::now(),
            completion_time: None,
            message: String::new(),
        }
    }

    /// Closes the record as skipped with the given reason.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = NodeStatus::Skip;
        self.message = reason.into();
        self.completion_time = Some(Utc::now());
    }
}
