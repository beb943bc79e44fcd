//! Node Executor Gateway
//!
//! Routes a node's declared type to the executor that performs it. The
//! routing table is built once at startup and shared read-only with the
//! runner.
//!
//! - Types listed in the configuration map to an [`HttpNodeExecutor`] over
//!   their instance addresses
//! - `null` always maps to [`NullExecutor`]
//! - Anything else falls back to [`UnsupportedExecutor`], which always errors
//!   so the run takes the retry path instead of crashing a worker

mod builtin;
mod http;

pub use builtin::{NullExecutor, UnsupportedExecutor};
pub use http::{HttpNodeExecutor, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use weft_core::dto::node::{NodeRequest, NodeResult};

/// Node type that succeeds immediately without calling anything
pub const NULL_TYPE: &str = "null";

/// Errors from invoking a node executor
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Executor answered with a non-success status
    #[error("executor error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Executor answered with an unreadable body
    #[error("failed to decode executor response: {0}")]
    Decode(String),

    /// No executor is configured for the type
    #[error("illegal node type {0:?}")]
    UnsupportedType(String),

    /// Route exists but lists no instances
    #[error("no instances configured for node type {0:?}")]
    NoInstances(String),

    /// Every attempt failed within the retry budget
    #[error("node executor failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<GatewayError>,
    },
}

/// Executor for one node type
///
/// Implementations must be safe to call concurrently; the same executor
/// serves every run.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Performs a step with resolved parameters and run metadata.
    async fn execute(&self, request: &NodeRequest) -> Result<NodeResult, GatewayError>;
}

/// Static route: a node type and the executor instances serving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRoute {
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub hosts: Vec<String>,
}

impl NodeRoute {
    pub fn new<I, S>(node_type: impl Into<String>, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            node_type: node_type.into(),
            hosts: hosts.into_iter().map(Into::into).collect(),
        }
    }
}

/// Immutable routing table from node type to executor
#[derive(Clone)]
pub struct NodeGateway {
    routes: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl NodeGateway {
    /// A gateway that only knows the `null` type
    pub fn new() -> Self {
        let mut routes: HashMap<String, Arc<dyn NodeExecutor>> = HashMap::new();
        routes.insert(NULL_TYPE.to_string(), Arc::new(NullExecutor));
        Self { routes }
    }

    /// Builds the table from configured routes, one HTTP executor per type.
    pub fn from_routes(
        routes: &[NodeRoute],
        client: reqwest::Client,
        policy: RetryPolicy,
    ) -> Self {
        routes.iter().fold(Self::new(), |gateway, route| {
            let executor = HttpNodeExecutor::with_client(
                route.node_type.clone(),
                &route.hosts,
                client.clone(),
                policy,
            );
            gateway.with_executor(route.node_type.clone(), executor)
        })
    }

    /// Registers `executor` for `node_type`, replacing any previous one.
    pub fn with_executor(
        mut self,
        node_type: impl Into<String>,
        executor: impl NodeExecutor + 'static,
    ) -> Self {
        self.routes.insert(node_type.into(), Arc::new(executor));
        self
    }

    /// Executor for `node_type`, or the always-failing fallback.
    pub fn resolve(&self, node_type: &str) -> Arc<dyn NodeExecutor> {
        match self.routes.get(node_type) {
            Some(executor) => Arc::clone(executor),
            None => Arc::new(UnsupportedExecutor::new(node_type)),
        }
    }

    pub fn knows(&self, node_type: &str) -> bool {
        self.routes.contains_key(node_type)
    }

    /// Routes `request` to the executor for `node_type`.
    pub async fn execute(
        &self,
        node_type: &str,
        request: &NodeRequest,
    ) -> Result<NodeResult, GatewayError> {
        self.resolve(node_type).execute(request).await
    }
}

impl Default for NodeGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for NodeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.routes.keys().collect();
        types.sort();
        f.debug_struct("NodeGateway").field("types", &types).finish()
    }
}
