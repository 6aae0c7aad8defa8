// SPDX-License-Identifier: MIT

//! Graph assembler
//!
//! Two-phase build: every row the workflow needs is loaded first (workflow,
//! nodes, edges, then one batched prompt read), and only then are nodes
//! resolved and edges linked. The assembler never writes to the store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::types::{
    derive_output_key, AssembledGraph, Edge, EdgeCondition, Node, NodeId, NodeKind, TOOL_NAME_KEY,
};
use crate::error::WorkflowError;
use crate::store::{EdgeRow, GraphStore, NodeRow, StoreId};
use crate::workflow::condition;

/// Configuration key carrying an inline template for non-prompt nodes
pub const TEMPLATE_KEY: &str = "template";

/// Builds `AssembledGraph`s from stored rows
#[derive(Clone)]
pub struct GraphAssembler {
    store: Arc<dyn GraphStore>,
}

impl GraphAssembler {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Load and link the workflow's graph
    pub async fn assemble(&self, workflow_id: &str) -> Result<AssembledGraph, WorkflowError> {
        let workflow = match self.store.read_workflow(workflow_id).await? {
            Some(row) => row,
            None => {
                log::warn!("Workflow {} not found", workflow_id);
                return Err(WorkflowError::WorkflowNotFound(workflow_id.to_string()));
            }
        };
        let canonical_id = workflow.id.canonical();

        let node_rows = self.store.read_nodes(&canonical_id).await?;
        let edge_rows = self.store.read_edges(&canonical_id).await?;

        let prompt_ids: Vec<String> = node_rows
            .iter()
            .filter(|row| NodeKind::parse(&row.kind) == NodeKind::Prompt)
            .filter_map(|row| row.prompt_id.as_ref().map(StoreId::canonical))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let prompts = if prompt_ids.is_empty() {
            HashMap::new()
        } else {
            self.store.read_prompts(&prompt_ids).await?
        };

        let mut nodes = BTreeMap::new();
        for row in &node_rows {
            let node = resolve_node(&canonical_id, row, &prompts)?;
            if let Some(previous) = nodes.insert(node.id.clone(), node) {
                log::warn!(
                    "Workflow {}: duplicate node id {}, keeping the later row",
                    canonical_id,
                    previous.id
                );
            }
        }

        let adjacency = link_edges(&canonical_id, edge_rows, &nodes)?;

        let entry_node = workflow.entry_node.as_ref().map(NodeId::from);
        if let Some(entry) = &entry_node {
            if !nodes.contains_key(entry) {
                log::warn!(
                    "Workflow {}: entry node {} does not belong to the workflow",
                    canonical_id,
                    entry
                );
            }
        }

        log::debug!(
            "Assembled workflow {} with {} nodes and {} edges",
            canonical_id,
            nodes.len(),
            adjacency.values().map(Vec::len).sum::<usize>()
        );

        Ok(AssembledGraph {
            workflow_id: canonical_id,
            name: workflow.name,
            entry_node,
            nodes,
            adjacency,
        })
    }
}

fn resolve_node(
    workflow_id: &str,
    row: &NodeRow,
    prompts: &HashMap<String, String>,
) -> Result<Node, WorkflowError> {
    let id = NodeId::from(&row.id);
    let kind = NodeKind::parse(&row.kind);

    let mut config = resolve_config(&row.config).map_err(|reason| {
        log::error!(
            "Workflow {}: malformed configuration on node {}: {}",
            workflow_id,
            id,
            reason
        );
        WorkflowError::malformed_config(id.as_str(), reason)
    })?;

    let prompt = if kind == NodeKind::Prompt {
        match &row.prompt_id {
            Some(prompt_id) => {
                let content = prompts.get(&prompt_id.canonical()).cloned();
                if content.is_none() {
                    log::warn!(
                        "Workflow {}: node {} references unknown prompt {}",
                        workflow_id,
                        id,
                        prompt_id
                    );
                }
                content
            }
            None => row.response_template.clone(),
        }
    } else {
        if let Some(template) = &row.response_template {
            config
                .entry(TEMPLATE_KEY.to_string())
                .or_insert_with(|| Value::String(template.clone()));
        }
        None
    };

    if let Some(function) = row.function_name.as_deref().filter(|f| !f.trim().is_empty()) {
        config.insert(TOOL_NAME_KEY.to_string(), Value::String(function.to_string()));
    }

    Ok(Node {
        id,
        kind,
        output_key: derive_output_key(row.name.as_deref()),
        name: row.name.clone(),
        config,
        prompt,
    })
}

/// Stored config is either structured JSON or a serialized JSON string
pub(crate) fn resolve_config(raw: &Option<Value>) -> Result<Map<String, Value>, String> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(Value::Null) => Ok(Map::new()),
            Ok(other) => Err(format!("expected a JSON object, found {}", json_type(&other))),
            Err(e) => Err(e.to_string()),
        },
        Some(other) => Err(format!("expected a JSON object, found {}", json_type(other))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn resolve_condition(
    workflow_id: &str,
    row: &EdgeRow,
) -> Result<EdgeCondition, WorkflowError> {
    let value = row
        .condition_value
        .as_deref()
        .filter(|v| !v.trim().is_empty());
    let condition_type = row
        .condition_type
        .as_deref()
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty());

    let condition = match (condition_type.as_deref(), value) {
        (Some("always" | "unconditional"), _) => EdgeCondition::Always,
        (Some("default" | "fallback"), _) => EdgeCondition::Default,
        (_, None) => EdgeCondition::Always,
        (Some("expression" | "when"), Some(source)) => match condition::parse(source) {
            Ok(expr) => EdgeCondition::Expression {
                source: source.trim().to_string(),
                expr,
            },
            Err(e) => {
                log::error!(
                    "Workflow {}: bad condition on edge {} -> {}: {}",
                    workflow_id,
                    row.source,
                    row.target,
                    e
                );
                return Err(WorkflowError::MalformedEdgeCondition {
                    source_id: row.source.canonical(),
                    target_id: row.target.canonical(),
                    reason: e.to_string(),
                });
            }
        },
        (None | Some("equals" | "equality" | "eq" | "match"), Some(v)) => {
            EdgeCondition::Equals(v.to_string())
        }
        (Some(other), Some(v)) => {
            log::warn!(
                "Workflow {}: unknown condition type '{}' on edge {} -> {}, matching by equality",
                workflow_id,
                other,
                row.source,
                row.target
            );
            EdgeCondition::Equals(v.to_string())
        }
    };
    Ok(condition)
}

fn link_edges(
    workflow_id: &str,
    mut rows: Vec<EdgeRow>,
    nodes: &BTreeMap<NodeId, Node>,
) -> Result<BTreeMap<NodeId, Vec<Edge>>, WorkflowError> {
    // Stable: rows sharing a position keep their read order
    rows.sort_by_key(|row| row.position);

    let mut adjacency: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();
    for row in &rows {
        let edge = Edge {
            source: NodeId::from(&row.source),
            target: NodeId::from(&row.target),
            condition: resolve_condition(workflow_id, row)?,
        };

        for endpoint in [&edge.source, &edge.target] {
            if !nodes.contains_key(endpoint) {
                log::warn!(
                    "Workflow {}: edge {} -> {} references unknown node {}",
                    workflow_id,
                    edge.source,
                    edge.target,
                    endpoint
                );
            }
        }

        adjacency.entry(edge.source.clone()).or_default().push(edge);
    }

    for (source, edges) in &adjacency {
        let unconditional = edges
            .iter()
            .filter(|e| e.condition.is_unconditional())
            .count();
        if unconditional > 1 {
            log::warn!(
                "Workflow {}: node {} has {} unconditional edges; only the first can match",
                workflow_id,
                source,
                unconditional
            );
        }
    }

    Ok(adjacency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryGraphStore, NewWorkflow, PromptRow, WorkflowRow};
    use chrono::Utc;
    use serde_json::json;

    fn node_row(workflow_id: &StoreId, id: &str, kind: &str, name: Option<&str>) -> NodeRow {
        NodeRow {
            id: StoreId::from(id),
            workflow_id: workflow_id.clone(),
            kind: kind.to_string(),
            name: name.map(str::to_string),
            config: None,
            response_template: None,
            prompt_id: None,
            function_name: None,
        }
    }

    fn edge_row(
        workflow_id: &StoreId,
        source: &str,
        target: &str,
        condition: Option<(&str, &str)>,
        position: i64,
    ) -> EdgeRow {
        EdgeRow {
            workflow_id: workflow_id.clone(),
            source: StoreId::from(source),
            target: StoreId::from(target),
            condition_value: condition.map(|(_, v)| v.to_string()),
            condition_type: condition.map(|(t, _)| t.to_string()),
            position,
        }
    }

    async fn store_with(
        entry: Option<&str>,
        nodes: impl FnOnce(&StoreId) -> Vec<NodeRow>,
        edges: impl FnOnce(&StoreId) -> Vec<EdgeRow>,
    ) -> (Arc<InMemoryGraphStore>, String) {
        let store = Arc::new(InMemoryGraphStore::new());
        let id = StoreId::new_uuid();
        let now = Utc::now();
        let record = NewWorkflow {
            workflow: WorkflowRow {
                id: id.clone(),
                agent_id: "agent".to_string(),
                name: "wf".to_string(),
                description: String::new(),
                entry_node: entry.map(StoreId::from),
                created_at: now,
                updated_at: now,
            },
            nodes: nodes(&id),
            edges: edges(&id),
            prompts: vec![],
        };
        store.create_workflow(&record).await.unwrap();
        (store, id.canonical())
    }

    #[tokio::test]
    async fn test_missing_workflow() {
        let assembler = GraphAssembler::new(Arc::new(InMemoryGraphStore::new()));
        let result = assembler.assemble("nope").await;
        assert!(matches!(result, Err(WorkflowError::WorkflowNotFound(id)) if id == "nope"));
    }

    #[tokio::test]
    async fn test_prompt_resolution() {
        let (store, id) = store_with(
            Some("a"),
            |wf| {
                let mut referenced = node_row(wf, "a", "prompt", Some("Greeting"));
                referenced.prompt_id = Some(StoreId::from("p-greet"));
                referenced.response_template = Some("ignored".to_string());
                let mut inline = node_row(wf, "b", "prompt", Some("Inline"));
                inline.response_template = Some("Hello {{input}}".to_string());
                let mut dangling = node_row(wf, "c", "prompt", None);
                dangling.prompt_id = Some(StoreId::from("p-missing"));
                let bare = node_row(wf, "d", "prompt", None);
                vec![referenced, inline, dangling, bare]
            },
            |_| vec![],
        )
        .await;
        store
            .insert_prompt(&PromptRow {
                id: StoreId::from("p-greet"),
                content: "You greet people.".to_string(),
            })
            .await
            .unwrap();

        let graph = GraphAssembler::new(store).assemble(&id).await.unwrap();
        let prompt = |n: &str| graph.node(&NodeId::from(n)).unwrap().prompt.clone();
        assert_eq!(prompt("a").as_deref(), Some("You greet people."));
        assert_eq!(prompt("b").as_deref(), Some("Hello {{input}}"));
        assert_eq!(prompt("c"), None);
        assert_eq!(prompt("d"), None);
    }

    #[tokio::test]
    async fn test_config_resolution_and_tool_binding() {
        let (store, id) = store_with(
            None,
            |wf| {
                let mut structured = node_row(wf, "s", "tool", Some("Lookup Order"));
                structured.config = Some(json!({"timeout": 5}));
                structured.function_name = Some("lookup_order".to_string());
                let mut serialized = node_row(wf, "t", "template_response", Some("Reply"));
                serialized.config = Some(json!(r#"{"tone": "warm"}"#));
                serialized.response_template = Some("Thanks, {{input}}".to_string());
                vec![structured, serialized]
            },
            |_| vec![],
        )
        .await;

        let graph = GraphAssembler::new(store).assemble(&id).await.unwrap();
        let tool = graph.node(&NodeId::from("s")).unwrap();
        assert_eq!(tool.config["timeout"], json!(5));
        assert_eq!(tool.tool_name(), Some("lookup_order"));
        assert_eq!(tool.output_key.as_deref(), Some("lookup_order"));

        let reply = graph.node(&NodeId::from("t")).unwrap();
        assert_eq!(reply.config["tone"], json!("warm"));
        assert_eq!(reply.config[TEMPLATE_KEY], json!("Thanks, {{input}}"));
        assert!(reply.prompt.is_none());
    }

    #[tokio::test]
    async fn test_malformed_config_names_the_node() {
        let (store, id) = store_with(
            None,
            |wf| {
                let mut broken = node_row(wf, "broken", "tool", None);
                broken.config = Some(json!("{not json"));
                vec![broken]
            },
            |_| vec![],
        )
        .await;

        let result = GraphAssembler::new(store).assemble(&id).await;
        match result {
            Err(WorkflowError::MalformedNodeConfig { node_id, .. }) => assert_eq!(node_id, "broken"),
            other => panic!("Expected MalformedNodeConfig, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_object_config_is_malformed() {
        let (store, id) = store_with(
            None,
            |wf| {
                let mut listy = node_row(wf, "l", "tool", None);
                listy.config = Some(json!("[1, 2]"));
                vec![listy]
            },
            |_| vec![],
        )
        .await;

        let result = GraphAssembler::new(store).assemble(&id).await;
        assert!(matches!(result, Err(WorkflowError::MalformedNodeConfig { .. })));
    }

    #[tokio::test]
    async fn test_edges_grouped_in_definition_order() {
        let (store, id) = store_with(
            Some("n"),
            |wf| {
                ["n", "x", "y", "z"]
                    .iter()
                    .map(|n| node_row(wf, n, "prompt", None))
                    .collect()
            },
            |wf| {
                vec![
                    edge_row(wf, "n", "z", Some(("default", "")), 3),
                    edge_row(wf, "n", "x", Some(("equals", "A")), 1),
                    edge_row(wf, "n", "y", Some(("equals", "B")), 2),
                    edge_row(wf, "x", "y", None, 4),
                ]
            },
        )
        .await;

        let graph = GraphAssembler::new(store).assemble(&id).await.unwrap();
        let targets: Vec<&str> = graph
            .outgoing(&NodeId::from("n"))
            .iter()
            .map(|e| e.target.as_str())
            .collect();
        assert_eq!(targets, vec!["x", "y", "z"]);
        assert_eq!(
            graph.outgoing(&NodeId::from("x"))[0].condition,
            EdgeCondition::Always
        );
        assert_eq!(graph.entry_node, Some(NodeId::from("n")));
    }

    #[test]
    fn test_condition_type_mapping() {
        let wf = StoreId::from("wf");
        let cases = [
            (Some(("always", "x")), EdgeCondition::Always),
            (Some(("fallback", "")), EdgeCondition::Default),
            (Some(("equality", "A")), EdgeCondition::Equals("A".to_string())),
            (Some(("mystery", "A")), EdgeCondition::Equals("A".to_string())),
            (Some(("equals", "  ")), EdgeCondition::Always),
            (None, EdgeCondition::Always),
        ];
        for (condition, expected) in cases {
            let row = edge_row(&wf, "a", "b", condition, 0);
            assert_eq!(resolve_condition("wf", &row).unwrap(), expected);
        }

        let row = EdgeRow {
            condition_value: Some("refund".to_string()),
            condition_type: None,
            ..edge_row(&wf, "a", "b", None, 0)
        };
        assert_eq!(
            resolve_condition("wf", &row).unwrap(),
            EdgeCondition::Equals("refund".to_string())
        );
    }

    #[tokio::test]
    async fn test_bad_expression_fails_assembly() {
        let (store, id) = store_with(
            Some("a"),
            |wf| vec![node_row(wf, "a", "prompt", None), node_row(wf, "b", "prompt", None)],
            |wf| vec![edge_row(wf, "a", "b", Some(("expression", "score >>> 3")), 0)],
        )
        .await;

        let result = GraphAssembler::new(store).assemble(&id).await;
        assert!(matches!(
            result,
            Err(WorkflowError::MalformedEdgeCondition { .. })
        ));
    }

    #[tokio::test]
    async fn test_identifiers_are_normalized() {
        let node_uuid = uuid::Uuid::new_v4();
        let upper = node_uuid.to_string().to_uppercase();
        let (store, id) = store_with(
            Some(&upper),
            |wf| {
                let mut row = node_row(wf, "x", "prompt", None);
                row.id = StoreId::Uuid(node_uuid);
                vec![row]
            },
            |_| vec![],
        )
        .await;

        let graph = GraphAssembler::new(store).assemble(&id).await.unwrap();
        let entry = graph.entry_node.clone().unwrap();
        assert_eq!(entry.as_str(), node_uuid.to_string());
        assert!(graph.node(&entry).is_some());
    }

    #[tokio::test]
    async fn test_reassembly_is_idempotent() {
        let (store, id) = store_with(
            Some("a"),
            |wf| {
                vec![
                    node_row(wf, "a", "prompt", Some("Greeting")),
                    node_row(wf, "b", "template_response", Some("Fare Well")),
                ]
            },
            |wf| vec![edge_row(wf, "a", "b", None, 0)],
        )
        .await;

        let assembler = GraphAssembler::new(store);
        let first = assembler.assemble(&id).await.unwrap();
        let second = assembler.assemble(&id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_workflow() {
        let (store, id) = store_with(None, |_| vec![], |_| vec![]).await;
        let graph = GraphAssembler::new(store).assemble(&id).await.unwrap();
        assert!(graph.is_empty());
        assert!(graph.entry_node.is_none());
    }
}
