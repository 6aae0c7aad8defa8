// SPDX-License-Identifier: MIT

//! Definition schema for importing and patching workflows
//!
//! These are the author-facing shapes (YAML or JSON). The lifecycle manager
//! turns them into store rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A complete workflow as authored
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Node id traversal starts at; may be omitted only when there are no nodes
    #[serde(default)]
    pub entry_node: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    /// Definition order is routing order
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Prompts stored alongside the workflow and referenced by `prompt_id`
    #[serde(default)]
    pub prompts: Vec<PromptDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NodeDefinition {
    pub id: String,
    /// `prompt`, `tool`, `template_response`, `end`, or anything else
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Option<Value>,
    /// Bound function/tool name
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
    /// Inline response template
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EdgeDefinition {
    pub source: String,
    pub target: String,
    /// Condition value: a routing label or an expression
    #[serde(default)]
    pub condition: Option<String>,
    /// `equals`, `default`, `always` or `expression`
    #[serde(default)]
    pub condition_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PromptDefinition {
    pub id: String,
    pub content: String,
}

/// Optional-field update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WorkflowPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// `Some(None)` clears the entry node
    #[serde(
        default,
        with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub entry_node: Option<Option<String>>,
    /// Replaces every node when present
    #[serde(default)]
    pub nodes: Option<Vec<NodeDefinition>>,
    /// Replaces every edge when present
    #[serde(default)]
    pub edges: Option<Vec<EdgeDefinition>>,
}

impl WorkflowPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.entry_node.is_none()
            && self.nodes.is_none()
            && self.edges.is_none()
    }
}

/// Distinguishes an absent field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Option<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Option<String>>, D::Error> {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}
