// SPDX-License-Identifier: MIT

//! Workflow lifecycle: create, read, update and delete definitions
//!
//! Every write is validated as a whole graph before it reaches the store and
//! evicts the workflow's cached graph afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::cache::GraphCache;
use super::graph::{resolve_condition, resolve_config, AssembledGraph, GraphAssembler};
use super::types::{
    EdgeDefinition, NodeDefinition, PromptDefinition, WorkflowDefinition, WorkflowPatch,
};
use crate::error::WorkflowError;
use crate::store::{
    EdgeRow, GraphStore, NewWorkflow, NodeRow, PromptRow, RowPatch, StoreId, WorkflowRow,
};

pub struct LifecycleManager {
    store: Arc<dyn GraphStore>,
    assembler: GraphAssembler,
    cache: Option<GraphCache>,
}

impl LifecycleManager {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            assembler: GraphAssembler::new(store.clone()),
            store,
            cache: None,
        }
    }

    /// Share a graph cache with the execution service
    pub fn with_cache(mut self, cache: GraphCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Validate and store a new workflow under a fresh id
    pub async fn create(
        &self,
        agent_id: &str,
        definition: &WorkflowDefinition,
    ) -> Result<WorkflowRow, WorkflowError> {
        if agent_id.trim().is_empty() {
            return Err(WorkflowError::invalid("agent id must not be empty"));
        }
        if definition.name.trim().is_empty() {
            return Err(WorkflowError::invalid("workflow name must not be empty"));
        }

        let id = StoreId::new_uuid();
        let nodes = node_rows(&id, &definition.nodes)?;
        let edges = edge_rows(&id, &definition.edges);
        let entry_node = definition.entry_node.as_deref().map(StoreId::parse);
        validate_graph(&id.canonical(), entry_node.as_ref(), &nodes, &edges)?;

        let prompts = self.prompt_rows(&definition.prompts).await?;

        let now = Utc::now();
        let workflow = WorkflowRow {
            id: id.clone(),
            agent_id: agent_id.to_string(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            entry_node,
            created_at: now,
            updated_at: now,
        };
        self.store
            .create_workflow(&NewWorkflow {
                workflow: workflow.clone(),
                nodes,
                edges,
                prompts,
            })
            .await?;

        log::info!(
            "Created workflow {} ('{}') for agent {}",
            id,
            workflow.name,
            agent_id
        );
        self.invalidate(&id.canonical()).await;
        Ok(workflow)
    }

    pub async fn get(&self, workflow_id: &str) -> Result<WorkflowRow, WorkflowError> {
        self.store
            .read_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Workflows owned by an agent, newest first
    pub async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<WorkflowRow>, WorkflowError> {
        Ok(self.store.list_workflows(agent_id).await?)
    }

    /// Assembled graph of the agent's most recently created workflow
    pub async fn latest_for_agent(
        &self,
        agent_id: &str,
    ) -> Result<Option<AssembledGraph>, WorkflowError> {
        let rows = self.store.list_workflows(agent_id).await?;
        match rows.first() {
            Some(row) => Ok(Some(self.assembler.assemble(&row.id.canonical()).await?)),
            None => Ok(None),
        }
    }

    /// Apply a partial update; the patched graph is validated as a whole
    pub async fn update(
        &self,
        workflow_id: &str,
        patch: &WorkflowPatch,
    ) -> Result<WorkflowRow, WorkflowError> {
        let current = self.get(workflow_id).await?;
        let canonical_id = current.id.canonical();

        if patch.is_empty() {
            return Ok(current);
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(WorkflowError::invalid("workflow name must not be empty"));
        }

        let nodes = match &patch.nodes {
            Some(defs) => node_rows(&current.id, defs)?,
            None => self.store.read_nodes(&canonical_id).await?,
        };
        let edges = match &patch.edges {
            Some(defs) => edge_rows(&current.id, defs),
            None => self.store.read_edges(&canonical_id).await?,
        };
        let entry_node = match &patch.entry_node {
            Some(entry) => entry.as_deref().map(StoreId::parse),
            None => current.entry_node.clone(),
        };
        validate_graph(&canonical_id, entry_node.as_ref(), &nodes, &edges)?;

        let row_patch = RowPatch {
            name: patch.name.clone(),
            description: patch.description.clone(),
            entry_node: patch.entry_node.as_ref().map(|_| entry_node),
            nodes: patch.nodes.as_ref().map(|_| nodes),
            edges: patch.edges.as_ref().map(|_| edges),
        };

        let updated = self
            .store
            .update_workflow(&canonical_id, &row_patch, Utc::now())
            .await?;
        if !updated {
            return Err(WorkflowError::WorkflowNotFound(workflow_id.to_string()));
        }

        log::info!("Updated workflow {}", canonical_id);
        self.invalidate(&canonical_id).await;
        self.get(&canonical_id).await
    }

    pub async fn delete(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        if !self.store.delete_workflow(workflow_id).await? {
            return Err(WorkflowError::WorkflowNotFound(workflow_id.to_string()));
        }
        log::info!("Deleted workflow {}", workflow_id);
        self.invalidate(workflow_id).await;
        Ok(())
    }

    /// Prompts are shared by id; re-importing identical content is a no-op.
    /// The store re-checks content when it writes them with the workflow.
    async fn prompt_rows(
        &self,
        prompts: &[PromptDefinition],
    ) -> Result<Vec<PromptRow>, WorkflowError> {
        let mut rows = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let id = StoreId::parse(&prompt.id);
            match self.store.read_prompt(&id.canonical()).await? {
                Some(existing) if existing == prompt.content => {
                    log::debug!("Prompt {} already stored", id);
                }
                Some(_) => {
                    return Err(WorkflowError::invalid(format!(
                        "prompt {} already exists with different content",
                        id
                    )));
                }
                None => {}
            }
            rows.push(PromptRow {
                id,
                content: prompt.content.clone(),
            });
        }
        Ok(rows)
    }

    async fn invalidate(&self, workflow_id: &str) {
        if let Some(cache) = &self.cache {
            cache.invalidate(workflow_id).await;
        }
    }
}

fn node_rows(
    workflow_id: &StoreId,
    defs: &[NodeDefinition],
) -> Result<Vec<NodeRow>, WorkflowError> {
    defs.iter()
        .map(|def| {
            if def.kind.trim().is_empty() {
                return Err(WorkflowError::invalid(format!("node {} has no kind", def.id)));
            }
            let config = resolve_config(&def.config)
                .map_err(|reason| WorkflowError::malformed_config(def.id.as_str(), reason))?;

            Ok(NodeRow {
                id: StoreId::parse(&def.id),
                workflow_id: workflow_id.clone(),
                kind: def.kind.trim().to_string(),
                name: def.name.clone(),
                config: (!config.is_empty()).then(|| Value::Object(config)),
                response_template: def.template.clone(),
                prompt_id: def.prompt_id.as_deref().map(StoreId::parse),
                function_name: def.function.clone(),
            })
        })
        .collect()
}

fn edge_rows(workflow_id: &StoreId, defs: &[EdgeDefinition]) -> Vec<EdgeRow> {
    defs.iter()
        .enumerate()
        .map(|(position, def)| EdgeRow {
            workflow_id: workflow_id.clone(),
            source: StoreId::parse(&def.source),
            target: StoreId::parse(&def.target),
            condition_value: def.condition.clone(),
            condition_type: def.condition_type.clone(),
            position: position as i64,
        })
        .collect()
}

/// Whole-graph checks applied before any write
fn validate_graph(
    workflow_id: &str,
    entry_node: Option<&StoreId>,
    nodes: &[NodeRow],
    edges: &[EdgeRow],
) -> Result<(), WorkflowError> {
    let mut ids = HashSet::with_capacity(nodes.len());
    for node in nodes {
        let id = node.id.canonical();
        if id.is_empty() {
            return Err(WorkflowError::invalid("node id must not be empty"));
        }
        if !ids.insert(id.clone()) {
            return Err(WorkflowError::invalid(format!("duplicate node id {}", id)));
        }
    }

    match entry_node {
        Some(entry) if !ids.contains(&entry.canonical()) => {
            return Err(WorkflowError::invalid(format!(
                "entry node {} is not a node of this workflow",
                entry
            )));
        }
        None if !nodes.is_empty() => {
            return Err(WorkflowError::invalid(
                "entry node is required when the workflow has nodes",
            ));
        }
        _ => {}
    }

    let mut unconditional: HashMap<String, usize> = HashMap::new();
    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(&endpoint.canonical()) {
                return Err(WorkflowError::invalid(format!(
                    "edge {} -> {} references unknown node {}",
                    edge.source, edge.target, endpoint
                )));
            }
        }
        if resolve_condition(workflow_id, edge)?.is_unconditional() {
            let count = unconditional.entry(edge.source.canonical()).or_default();
            *count += 1;
            if *count > 1 {
                return Err(WorkflowError::invalid(format!(
                    "node {} has more than one unconditional edge",
                    edge.source
                )));
            }
        }
    }

    Ok(())
}
