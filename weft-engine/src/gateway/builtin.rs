//! Executors that never leave the process

use async_trait::async_trait;
use weft_core::dto::node::{NodeRequest, NodeResult};

use super::{GatewayError, NodeExecutor};

/// Completes every step immediately with no output
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExecutor;

#[async_trait]
impl NodeExecutor for NullExecutor {
    async fn execute(&self, _request: &NodeRequest) -> Result<NodeResult, GatewayError> {
        Ok(NodeResult::finished())
    }
}

/// Fallback for node types with no route; always fails
#[derive(Debug, Clone)]
pub struct UnsupportedExecutor {
    node_type: String,
}

impl UnsupportedExecutor {
    pub fn new(node_type: impl Into<String>) -> Self {
        Self {
            node_type: node_type.into(),
        }
    }
}

#[async_trait]
impl NodeExecutor for UnsupportedExecutor {
    async fn execute(&self, _request: &NodeRequest) -> Result<NodeResult, GatewayError> {
        Err(GatewayError::UnsupportedType(self.node_type.clone()))
    }
}
