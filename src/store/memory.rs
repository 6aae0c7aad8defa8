// SPDX-License-Identifier: MIT

use super::{EdgeRow, GraphStore, NewWorkflow, NodeRow, PromptRow, RowPatch, StoreId, WorkflowRow};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    workflows: HashMap<String, WorkflowRow>,
    nodes: HashMap<String, Vec<NodeRow>>,
    edges: HashMap<String, Vec<EdgeRow>>,
    prompts: HashMap<String, String>,
}

/// Process-local graph store. Clones share the same tables.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(id: &str) -> String {
    StoreId::parse(id).canonical()
}

fn check_prompt(tables: &Tables, prompt: &PromptRow) -> Result<(), StoreError> {
    match tables.prompts.get(&prompt.id.canonical()) {
        Some(existing) if *existing != prompt.content => Err(StoreError::Conflict(format!(
            "prompt '{}' already exists with different content",
            prompt.id
        ))),
        _ => Ok(()),
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn read_workflow(&self, id: &str) -> Result<Option<WorkflowRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.workflows.get(&key(id)).cloned())
    }

    async fn read_nodes(&self, workflow_id: &str) -> Result<Vec<NodeRow>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.nodes.get(&key(workflow_id)).cloned().unwrap_or_default())
    }

    async fn read_edges(&self, workflow_id: &str) -> Result<Vec<EdgeRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut edges = tables.edges.get(&key(workflow_id)).cloned().unwrap_or_default();
        edges.sort_by_key(|e| e.position);
        Ok(edges)
    }

    async fn read_prompt(&self, id: &str) -> Result<Option<String>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.prompts.get(&key(id)).cloned())
    }

    async fn list_workflows(&self, agent_id: &str) -> Result<Vec<WorkflowRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WorkflowRow> = tables
            .workflows
            .values()
            .filter(|w| w.agent_id == agent_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.canonical().cmp(&a.id.canonical()))
        });
        Ok(rows)
    }

    async fn insert_prompt(&self, prompt: &PromptRow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        check_prompt(&tables, prompt)?;
        tables
            .prompts
            .insert(prompt.id.canonical(), prompt.content.clone());
        Ok(())
    }

    async fn create_workflow(&self, record: &NewWorkflow) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let id = record.workflow.id.canonical();
        if tables.workflows.contains_key(&id) {
            return Err(StoreError::Conflict(format!("workflow '{}' already exists", id)));
        }
        for prompt in &record.prompts {
            check_prompt(&tables, prompt)?;
        }

        for prompt in &record.prompts {
            tables
                .prompts
                .insert(prompt.id.canonical(), prompt.content.clone());
        }
        tables.workflows.insert(id.clone(), record.workflow.clone());
        tables.nodes.insert(id.clone(), record.nodes.clone());
        tables.edges.insert(id, record.edges.clone());
        Ok(())
    }

    async fn update_workflow(
        &self,
        id: &str,
        patch: &RowPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let id = key(id);

        let Some(row) = tables.workflows.get_mut(&id) else {
            return Ok(false);
        };
        if let Some(name) = &patch.name {
            row.name = name.clone();
        }
        if let Some(description) = &patch.description {
            row.description = description.clone();
        }
        if let Some(entry_node) = &patch.entry_node {
            row.entry_node = entry_node.clone();
        }
        row.updated_at = updated_at;

        if let Some(nodes) = &patch.nodes {
            tables.nodes.insert(id.clone(), nodes.clone());
        }
        if let Some(edges) = &patch.edges {
            tables.edges.insert(id, edges.clone());
        }
        Ok(true)
    }

    async fn delete_workflow(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let id = key(id);
        if tables.workflows.remove(&id).is_none() {
            return Ok(false);
        }
        tables.nodes.remove(&id);
        tables.edges.remove(&id);
        Ok(true)
    }
}
