// SPDX-License-Identifier: MIT

//! Assembled graph types
//!
//! The in-memory, storage-independent view of a workflow: canonical node ids,
//! typed node kinds, and per-source edge lists kept in definition order.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use crate::store::StoreId;
use crate::workflow::condition::{self, Expression};
use crate::workflow::state::ExecutionState;

/// Configuration key under which a bound function/tool name is exposed
pub const TOOL_NAME_KEY: &str = "tool_name";

/// Canonical node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&StoreId> for NodeId {
    fn from(id: &StoreId) -> Self {
        Self(id.canonical())
    }
}

impl From<&str> for NodeId {
    fn from(raw: &str) -> Self {
        Self(StoreId::parse(raw).canonical())
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a node does when visited
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Prompt,
    /// Function/tool call
    Tool,
    TemplateResponse,
    /// Terminal marker; reaching it ends traversal
    End,
    Other(String),
}

impl NodeKind {
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "prompt" => Self::Prompt,
            "tool" | "function" | "function_call" => Self::Tool,
            "template_response" | "template" | "response" => Self::TemplateResponse,
            "end" | "terminal" => Self::End,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Prompt => "prompt",
            Self::Tool => "tool",
            Self::TemplateResponse => "template_response",
            Self::End => "end",
            Self::Other(kind) => kind,
        }
    }

    /// Whether this node's output can become the final response
    pub fn is_response_bearing(&self) -> bool {
        matches!(self, Self::Prompt | Self::TemplateResponse)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A resolved node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: Option<String>,
    /// Resolved configuration; includes `tool_name` when a function is bound
    pub config: Map<String, Value>,
    /// Prompt content (referenced prompt or inline template)
    pub prompt: Option<String>,
    /// State key the node's output is written under
    pub output_key: Option<String>,
}

impl Node {
    /// Bound tool name, if any
    pub fn tool_name(&self) -> Option<&str> {
        self.config.get(TOOL_NAME_KEY).and_then(Value::as_str)
    }
}

/// Derive the state key for a node from its display name
///
/// Lower-cased, whitespace replaced by `_`. Blank names yield no key.
pub fn derive_output_key(name: Option<&str>) -> Option<String> {
    let name = name?.trim();
    if name.is_empty() {
        return None;
    }
    Some(
        name.to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect(),
    )
}

/// Matching strategy for an edge
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeCondition {
    /// Unconditional
    Always,
    /// Catch-all fallback
    Default,
    /// Routing hint must equal the value
    Equals(String),
    /// Boolean expression over execution state
    Expression { source: String, expr: Expression },
}

impl EdgeCondition {
    pub fn is_unconditional(&self) -> bool {
        matches!(self, Self::Always | Self::Default)
    }

    pub fn matches(&self, hint: Option<&str>, state: &ExecutionState) -> bool {
        match self {
            Self::Always | Self::Default => true,
            Self::Equals(value) => hint == Some(value.as_str()),
            Self::Expression { expr, .. } => condition::evaluate(expr, state),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Default => "default",
            Self::Equals(_) => "equals",
            Self::Expression { .. } => "expression",
        }
    }

    fn value(&self) -> Option<&str> {
        match self {
            Self::Always | Self::Default => None,
            Self::Equals(value) => Some(value),
            Self::Expression { source, .. } => Some(source),
        }
    }
}

impl Serialize for EdgeCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EdgeCondition", 2)?;
        s.serialize_field("type", self.type_name())?;
        s.serialize_field("value", &self.value())?;
        s.end()
    }
}

/// A directed edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub condition: EdgeCondition,
}

/// Immutable, traversable view of one workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssembledGraph {
    pub workflow_id: String,
    pub name: String,
    pub entry_node: Option<NodeId>,
    pub nodes: BTreeMap<NodeId, Node>,
    /// Outgoing edges per source, in definition order
    pub adjacency: BTreeMap<NodeId, Vec<Edge>>,
}

impl AssembledGraph {
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn outgoing(&self, id: &NodeId) -> &[Edge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First edge out of `id` whose condition matches; definition order wins
    pub fn select_edge(
        &self,
        id: &NodeId,
        hint: Option<&str>,
        state: &ExecutionState,
    ) -> Option<&Edge> {
        self.outgoing(id)
            .iter()
            .find(|edge| edge.condition.matches(hint, state))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
