// SPDX-License-Identifier: MIT

//! Remote node executor
//!
//! Forwards each node to an HTTP endpoint (an LLM gateway or tool runner)
//! and reads back `{ "output": ..., "routing_hint": ... }`.

use super::{NodeExecutor, NodeOutput};
use crate::error::BoxError;
use crate::workflow::graph::Node;
use crate::workflow::state::ExecutionState;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub struct HttpNodeExecutor {
    client: Client,
    endpoint: String,
}

impl HttpNodeExecutor {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(Client::new(), endpoint)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(node: &Node, state: &ExecutionState, input: &str) -> Value {
        json!({
            "node_id": node.id,
            "kind": node.kind,
            "name": node.name,
            "prompt": node.prompt,
            "config": node.config,
            "state": state.to_json(),
            "input": input,
        })
    }

    /// Accepts `{output, routing_hint?}`; any other body is taken as the output itself
    fn parse_response(body: Value) -> Result<NodeOutput, BoxError> {
        if body.get("output").is_some() {
            return Ok(serde_json::from_value(body)?);
        }
        Ok(NodeOutput::new(body))
    }
}

#[async_trait]
impl NodeExecutor for HttpNodeExecutor {
    async fn run(
        &self,
        node: &Node,
        state: &ExecutionState,
        input: &str,
    ) -> Result<NodeOutput, BoxError> {
        let body = Self::request_body(node, state, input);
        log::debug!("POST {} for node {}", self.endpoint, node.id);

        let resp = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(format!("Executor endpoint returned {}: {}", status, text).into());
        }

        let body: Value = resp.json().await?;
        Self::parse_response(body)
    }
}
