// SPDX-License-Identifier: MIT

//! Template rendering executor
//!
//! Renders `{{ path }}` placeholders against execution state. `{{ input }}`
//! is always the conversational input message.

use super::{NodeExecutor, NodeOutput};
use crate::error::BoxError;
use crate::workflow::graph::{value_to_text, Node};
use crate::workflow::state::ExecutionState;
use async_trait::async_trait;
use serde_json::Value;

const INPUT_PLACEHOLDER: &str = "input";

/// Executor that needs no external substrate
///
/// Template source, in order: the node's prompt content, `config.template`,
/// `config.response`. Nodes with none of these echo the input. When
/// `config.hint_from` names a state path, its value becomes the routing hint.
#[derive(Debug, Clone, Default)]
pub struct TemplateExecutor;

impl TemplateExecutor {
    pub fn new() -> Self {
        Self
    }

    fn template_for(node: &Node) -> Option<&str> {
        node.prompt.as_deref().or_else(|| {
            ["template", "response"]
                .iter()
                .find_map(|key| node.config.get(*key).and_then(Value::as_str))
        })
    }
}

/// Substitute placeholders; unknown paths render as empty text
pub fn render(template: &str, state: &ExecutionState, input: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unclosed placeholder stays literal
            out.push_str(&rest[start..]);
            return out;
        };

        let path = after[..end].trim();
        if path == INPUT_PLACEHOLDER {
            out.push_str(input);
        } else if let Some(value) = state.get_path(path) {
            out.push_str(&value_to_text(value));
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

fn hint_from(node: &Node, state: &ExecutionState) -> Option<String> {
    let path = node.config.get("hint_from")?.as_str()?;
    match state.get_path(path)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[async_trait]
impl NodeExecutor for TemplateExecutor {
    async fn run(
        &self,
        node: &Node,
        state: &ExecutionState,
        input: &str,
    ) -> Result<NodeOutput, BoxError> {
        let text = match Self::template_for(node) {
            Some(template) => render(template, state, input),
            None => input.to_string(),
        };
        log::debug!("Rendered node {}: {} chars", node.id, text.len());

        Ok(NodeOutput {
            output: Value::String(text),
            routing_hint: hint_from(node, state),
        })
    }
}
