//! Pipeline domain types

use serde::{Deserialize, Serialize};

/// A single key/value pair
///
/// Parameters, step outputs and communal variables are all flat ordered
/// lists of these. Lookups are first-match by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAndValue {
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl KeyAndValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Returns the value of the first entry named `key`.
pub fn lookup<'a>(key: &str, kvs: &'a [KeyAndValue]) -> Option<&'a str> {
    kvs.iter()
        .find(|kv| kv.key == key)
        .map(|kv| kv.value.as_str())
}

/// Sets `key` to `value`, updating the first matching entry in place or
/// appending a new one.
pub fn upsert(kvs: &mut Vec<KeyAndValue>, key: &str, value: &str) {
    match kvs.iter_mut().find(|kv| kv.key == key) {
        Some(kv) => kv.value = value.to_string(),
        None => kvs.push(KeyAndValue::new(key, value)),
    }
}

/// Declared pipeline input or communal variable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Name by which the parameter is referenced
    pub name: String,

    /// Value used when the run does not supply one
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,

    /// User-facing description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            description: String::new(),
        }
    }
}

/// Pipeline definition
///
/// Immutable template. A run embeds a value copy of it at creation time, so
/// later edits to the stored template never reach in-flight runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: PipelineSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Declared inputs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,

    /// Ordered steps
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<Node>,

    /// Declared variables shared by every step of a run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub communal: Vec<ParamSpec>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: PipelineSpec::default(),
        }
    }

    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.spec.params.push(param);
        self
    }

    pub fn with_communal(mut self, communal: ParamSpec) -> Self {
        self.spec.communal.push(communal);
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.spec.nodes.push(node);
        self
    }
}

/// Step definition within a pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within a pipeline; referenced by `$(task.<name>.output.<key>)`
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub spec: NodeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Selects the executor
    #[serde(rename = "type", default)]
    pub node_type: String,

    /// Steps that must be `Finish` before this one becomes eligible
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Literal values or `$(...)` references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<KeyAndValue>,

    /// Declared output keys; informational only
    #[serde(rename = "outPut", default, skip_serializing_if = "Vec::is_empty")]
    pub out_put: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub when: Vec<When>,
}

impl Node {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: NodeSpec {
                node_type: node_type.into(),
                ..NodeSpec::default()
            },
        }
    }

    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.spec.dependencies.push(name.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.params.push(KeyAndValue::new(key, value));
        self
    }

    pub fn with_output(mut self, key: impl Into<String>) -> Self {
        self.spec.out_put.push(key.into());
        self
    }

    pub fn when(mut self, when: When) -> Self {
        self.spec.when.push(when);
        self
    }
}

/// Condition gating a step
///
/// `operator` stays a plain string on the wire; unknown operators are
/// evaluated as "skip".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct When {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub input: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub operator: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl When {
    pub fn new<I, S>(input: impl Into<String>, operator: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            input: input.into(),
            operator: operator.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}
