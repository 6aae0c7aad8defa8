// SPDX-License-Identifier: MIT

//! Node executors
//!
//! The runner calls a `NodeExecutor` once per visited node. Executors are
//! polymorphic over node kind; `ExecutorRegistry` dispatches to the right one.

mod http;
mod template;

pub use http::HttpNodeExecutor;
pub use template::TemplateExecutor;

use crate::error::BoxError;
use crate::workflow::graph::{Node, NodeKind};
use crate::workflow::state::ExecutionState;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// What an executor produced for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeOutput {
    pub output: Value,
    /// Label used to choose among conditional outgoing edges
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_hint: Option<String>,
}

impl NodeOutput {
    pub fn new(output: impl Into<Value>) -> Self {
        Self {
            output: output.into(),
            routing_hint: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.routing_hint = Some(hint.into());
        self
    }
}

/// Evaluates a single node against the current state
///
/// Retry policy, if any, belongs to the implementation. An `Err` aborts the
/// whole traversal.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn run(
        &self,
        node: &Node,
        state: &ExecutionState,
        input: &str,
    ) -> Result<NodeOutput, BoxError>;
}

/// Dispatches to executors registered per node kind
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: Arc<RwLock<HashMap<String, Arc<dyn NodeExecutor>>>>,
    fallback: Option<Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executor used for kinds with no registration
    pub fn with_fallback(mut self, executor: Arc<dyn NodeExecutor>) -> Self {
        self.fallback = Some(executor);
        self
    }

    pub async fn register(&self, kind: NodeKind, executor: Arc<dyn NodeExecutor>) {
        let mut executors = self.executors.write().await;
        executors.insert(kind.as_str().to_string(), executor);
    }

    pub async fn get(&self, kind: &NodeKind) -> Option<Arc<dyn NodeExecutor>> {
        let executors = self.executors.read().await;
        executors
            .get(kind.as_str())
            .cloned()
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl NodeExecutor for ExecutorRegistry {
    async fn run(
        &self,
        node: &Node,
        state: &ExecutionState,
        input: &str,
    ) -> Result<NodeOutput, BoxError> {
        let executor = self
            .get(&node.kind)
            .await
            .ok_or_else(|| format!("No executor registered for node kind '{}'", node.kind))?;
        executor.run(node, state, input).await
    }
}
