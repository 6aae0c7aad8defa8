// SPDX-License-Identifier: MIT

//! Graph store adapter
//!
//! Raw row types for workflows, nodes, edges and prompts plus the
//! `GraphStore` trait that persistence backends implement. Nothing here
//! knows about graphs; the assembler links rows together.

mod memory;
mod sqlite;

pub use memory::InMemoryGraphStore;
pub use sqlite::SqliteGraphStore;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Identifier as the storage layer hands it out
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreId {
    Uuid(Uuid),
    Int(i64),
    Text(String),
}

impl StoreId {
    /// Classify raw text, promoting UUID-shaped values to `Uuid`
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match Uuid::parse_str(trimmed) {
            Ok(uuid) => Self::Uuid(uuid),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }

    /// Canonical string form; equal ids always produce equal strings
    pub fn canonical(&self) -> String {
        match self {
            Self::Uuid(uuid) => uuid.hyphenated().to_string(),
            Self::Int(n) => n.to_string(),
            Self::Text(text) => match Uuid::parse_str(text.trim()) {
                Ok(uuid) => uuid.hyphenated().to_string(),
                Err(_) => text.trim().to_string(),
            },
        }
    }

    pub fn new_uuid() -> Self {
        Self::Uuid(Uuid::new_v4())
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<&str> for StoreId {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<Uuid> for StoreId {
    fn from(uuid: Uuid) -> Self {
        Self::Uuid(uuid)
    }
}

impl From<i64> for StoreId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowRow {
    pub id: StoreId,
    pub agent_id: String,
    pub name: String,
    pub description: String,
    pub entry_node: Option<StoreId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: StoreId,
    pub workflow_id: StoreId,
    /// Raw node kind (`prompt`, `tool`, `template_response`, ...)
    pub kind: String,
    pub name: Option<String>,
    /// Either structured JSON or a serialized JSON string
    pub config: Option<Value>,
    pub response_template: Option<String>,
    pub prompt_id: Option<StoreId>,
    pub function_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub workflow_id: StoreId,
    pub source: StoreId,
    pub target: StoreId,
    pub condition_value: Option<String>,
    pub condition_type: Option<String>,
    /// Definition order among all edges of the workflow
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptRow {
    pub id: StoreId,
    pub content: String,
}

/// Workflow plus its nodes, edges and shared prompts, written in one transaction
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub workflow: WorkflowRow,
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
    /// Stored with `insert_prompt` semantics
    pub prompts: Vec<PromptRow>,
}

/// Row-level partial update; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct RowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    /// `Some(None)` clears the entry node
    pub entry_node: Option<Option<StoreId>>,
    /// Replaces every node row when present
    pub nodes: Option<Vec<NodeRow>>,
    /// Replaces every edge row when present
    pub edges: Option<Vec<EdgeRow>>,
}

/// Persistence backend for workflow definitions
///
/// All reads for one assembly are assumed to see the same snapshot. Retry
/// policy, if any, lives in the implementation.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn read_workflow(&self, id: &str) -> Result<Option<WorkflowRow>, StoreError>;

    async fn read_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRow>, StoreError>;

    /// Edges in definition order
    async fn read_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRow>, StoreError>;

    async fn read_prompt(&self, id: &str) -> Result<Option<String>, StoreError>;

    /// Batched prompt lookup keyed by canonical prompt id; missing ids are absent
    async fn read_prompts(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let mut found = HashMap::new();
        for id in ids {
            if let Some(content) = self.read_prompt(id).await? {
                found.insert(StoreId::parse(id).canonical(), content);
            }
        }
        Ok(found)
    }

    /// Workflows owned by an agent, newest first
    async fn list_workflows(&self, agent_id: &str) -> Result<Vec<WorkflowRow>, StoreError>;

    /// Store a shared prompt. Identical content already under the id is
    /// accepted; different content is a `Conflict`.
    async fn insert_prompt(&self, prompt: &PromptRow) -> Result<(), StoreError>;

    /// All-or-nothing: a prompt conflict leaves no rows behind
    async fn create_workflow(&self, record: &NewWorkflow) -> Result<(), StoreError>;

    /// Returns false when the workflow does not exist
    async fn update_workflow(
        &self,
        id: &str,
        patch: &RowPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns false when the workflow does not exist
    async fn delete_workflow(&self, id: &str) -> Result<bool, StoreError>;
}
