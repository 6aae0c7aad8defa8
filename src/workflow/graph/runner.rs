// SPDX-License-Identifier: MIT

//! Workflow runner
//!
//! Walks an assembled graph from its entry node, one node per step, calling
//! the executor for each visited node and following the first matching
//! outgoing edge. The run is strictly linear: no branch is explored in
//! parallel and nothing is written to storage.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::{AssembledGraph, NodeId, NodeKind};
use crate::error::WorkflowError;
use crate::executor::{NodeExecutor, NodeOutput};
use crate::workflow::state::ExecutionState;

/// Why a traversal stopped
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Termination {
    /// Cursor empty or pointing at an unknown node
    EndOfGraph,
    /// Reached a node of the terminal kind
    TerminalNode { node_id: NodeId },
    /// Outgoing edges existed but none matched
    NoMatchingEdge { node_id: NodeId },
    /// Iteration budget exhausted; the result is partial
    MaxIterationsExceeded { limit: u32 },
}

/// One visited node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// Execution state as the node observed it
    pub input: Value,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Text of the last response-bearing node's output; never absent
    pub response: String,
    pub history: Vec<HistoryEntry>,
    pub iterations: u32,
    pub state: Map<String, Value>,
    pub termination: Termination,
}

impl ExecutionResult {
    /// False only when the iteration budget cut the run short
    pub fn is_complete(&self) -> bool {
        !matches!(self.termination, Termination::MaxIterationsExceeded { .. })
    }

    /// Treat a partial result as an error
    pub fn into_complete(self) -> Result<Self, WorkflowError> {
        match self.termination {
            Termination::MaxIterationsExceeded { limit } => {
                Err(WorkflowError::MaxIterationsExceeded { limit })
            }
            _ => Ok(self),
        }
    }
}

/// Executes assembled graphs with a fixed executor and iteration budget
#[derive(Clone)]
pub struct WorkflowRunner {
    executor: Arc<dyn NodeExecutor>,
    max_iterations: u32,
}

impl WorkflowRunner {
    pub fn new(executor: Arc<dyn NodeExecutor>, max_iterations: u32) -> Self {
        Self {
            executor,
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run one traversal
    ///
    /// `initial_context` seeds the execution state before the first node.
    /// An executor failure aborts the run; an exhausted budget does not.
    pub async fn execute(
        &self,
        graph: &AssembledGraph,
        input: &str,
        initial_context: Map<String, Value>,
    ) -> Result<ExecutionResult, WorkflowError> {
        let mut state = ExecutionState::from_context(initial_context);
        let mut history: Vec<HistoryEntry> = Vec::new();
        let mut iterations: u32 = 0;
        let mut response: Option<String> = None;
        let mut cursor = graph.entry_node.clone();

        let termination = loop {
            let Some(node_id) = cursor.take() else {
                break Termination::EndOfGraph;
            };
            let Some(node) = graph.node(&node_id) else {
                log::warn!(
                    "Workflow {}: cursor reached unknown node {}",
                    graph.workflow_id,
                    node_id
                );
                break Termination::EndOfGraph;
            };

            if node.kind.is_terminal() {
                break Termination::TerminalNode { node_id };
            }

            if iterations >= self.max_iterations {
                log::warn!(
                    "Workflow {}: iteration budget of {} exhausted at node {}",
                    graph.workflow_id,
                    self.max_iterations,
                    node_id
                );
                break Termination::MaxIterationsExceeded {
                    limit: self.max_iterations,
                };
            }

            log::info!("Executing node {} ({})", node_id, node.kind);
            let snapshot = state.to_json();

            let NodeOutput {
                output,
                routing_hint,
            } = self
                .executor
                .run(node, &state, input)
                .await
                .map_err(|cause| {
                    log::error!(
                        "Workflow {}: node {} failed after {} steps: {}",
                        graph.workflow_id,
                        node_id,
                        iterations,
                        cause
                    );
                    WorkflowError::NodeExecutionFailed {
                        node_id: node_id.to_string(),
                        cause,
                    }
                })?;

            if let Some(key) = &node.output_key {
                state.update(key, output.clone());
            }
            if node.kind.is_response_bearing() {
                response = Some(value_to_text(&output));
            }
            iterations += 1;

            let next = graph
                .select_edge(&node_id, routing_hint.as_deref(), &state)
                .map(|edge| edge.target.clone());
            let has_outgoing = !graph.outgoing(&node_id).is_empty();

            log::debug!(
                "Node {} done (hint: {:?}), next: {:?}",
                node_id,
                routing_hint,
                next
            );

            history.push(HistoryEntry {
                node_id: node_id.clone(),
                kind: node.kind.clone(),
                input: snapshot,
                output,
                routing_hint,
            });

            match next {
                Some(target) => cursor = Some(target),
                None if has_outgoing => break Termination::NoMatchingEdge { node_id },
                None => break Termination::EndOfGraph,
            }
        };

        log::info!(
            "Workflow {} finished after {} iterations: {:?}",
            graph.workflow_id,
            iterations,
            termination
        );

        Ok(ExecutionResult {
            response: response.unwrap_or_default(),
            history,
            iterations,
            state: state.into_map(),
            termination,
        })
    }
}

/// Convert a JSON value to readable text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(v) = obj
                    .get("result")
                    .or(obj.get("answer"))
                    .or(obj.get("response"))
                {
                    return value_to_text(v);
                }
            }
            obj.iter()
                .map(|(k, v)| format!("**{}**: {}", k, value_to_text(v)))
                .collect::<Vec<_>>()
                .join("\n")
        }
        Value::Array(arr) => arr
            .iter()
            .map(|v| format!("- {}", value_to_text(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::workflow::condition;
    use crate::workflow::graph::{derive_output_key, Edge, EdgeCondition, Node};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a canned output (and optional hint) per node id; counts calls
    #[derive(Default)]
    struct Scripted {
        outputs: HashMap<&'static str, (Value, Option<&'static str>)>,
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn output(mut self, node: &'static str, output: Value, hint: Option<&'static str>) -> Self {
            self.outputs.insert(node, (output, hint));
            self
        }

        fn failing_on(mut self, node: &'static str) -> Self {
            self.fail_on = Some(node);
            self
        }
    }

    #[async_trait]
    impl NodeExecutor for Scripted {
        async fn run(
            &self,
            node: &Node,
            _state: &ExecutionState,
            input: &str,
        ) -> Result<NodeOutput, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(node.id.as_str()) {
                return Err("upstream timed out".into());
            }
            let (output, hint) = self
                .outputs
                .get(node.id.as_str())
                .cloned()
                .unwrap_or((json!(format!("{} saw {}", node.id, input)), None));
            Ok(NodeOutput {
                output,
                routing_hint: hint.map(str::to_string),
            })
        }
    }

    fn node(id: &str, kind: NodeKind, name: Option<&str>) -> Node {
        Node {
            id: NodeId::from(id),
            kind,
            name: name.map(str::to_string),
            config: Map::new(),
            prompt: None,
            output_key: derive_output_key(name),
        }
    }

    fn edge(source: &str, target: &str, condition: EdgeCondition) -> Edge {
        Edge {
            source: NodeId::from(source),
            target: NodeId::from(target),
            condition,
        }
    }

    fn graph(entry: Option<&str>, nodes: Vec<Node>, edges: Vec<Edge>) -> AssembledGraph {
        let mut adjacency: BTreeMap<NodeId, Vec<Edge>> = BTreeMap::new();
        for e in edges {
            adjacency.entry(e.source.clone()).or_default().push(e);
        }
        AssembledGraph {
            workflow_id: "wf".to_string(),
            name: "test".to_string(),
            entry_node: entry.map(NodeId::from),
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
            adjacency,
        }
    }

    fn runner(executor: Arc<Scripted>, max: u32) -> WorkflowRunner {
        WorkflowRunner::new(executor, max)
    }

    #[tokio::test]
    async fn test_two_node_scenario() {
        let g = graph(
            Some("n1"),
            vec![
                node("n1", NodeKind::Prompt, Some("Greeting")),
                node("n2", NodeKind::TemplateResponse, Some("Farewell")),
            ],
            vec![edge("n1", "n2", EdgeCondition::Always)],
        );
        let executor = Arc::new(
            Scripted::default()
                .output("n1", json!("Hello!"), None)
                .output("n2", json!("Goodbye!"), None),
        );

        let result = runner(executor, 25).execute(&g, "hi", Map::new()).await.unwrap();

        let visited: Vec<&str> = result.history.iter().map(|h| h.node_id.as_str()).collect();
        assert_eq!(visited, vec!["n1", "n2"]);
        assert_eq!(result.iterations, 2);
        assert_eq!(result.state["greeting"], json!("Hello!"));
        assert_eq!(result.state["farewell"], json!("Goodbye!"));
        assert_eq!(result.response, "Goodbye!");
        assert_eq!(result.termination, Termination::EndOfGraph);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_zero_nodes() {
        let g = graph(None, vec![], vec![]);
        let executor = Arc::new(Scripted::default());

        let result = runner(executor.clone(), 25)
            .execute(&g, "hi", Map::new())
            .await
            .unwrap();
        assert_eq!(result.response, "");
        assert!(result.history.is_empty());
        assert_eq!(result.iterations, 0);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cycle_stops_at_budget() {
        let g = graph(
            Some("a"),
            vec![
                node("a", NodeKind::Prompt, Some("A")),
                node("b", NodeKind::Tool, Some("B")),
            ],
            vec![
                edge("a", "b", EdgeCondition::Always),
                edge("b", "a", EdgeCondition::Always),
            ],
        );
        let executor = Arc::new(Scripted::default());

        let result = runner(executor.clone(), 5)
            .execute(&g, "loop", Map::new())
            .await
            .unwrap();
        assert_eq!(result.iterations, 5);
        assert_eq!(result.history.len(), 5);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 5);
        assert!(!result.is_complete());
        assert_eq!(result.response, "a saw loop");
        assert!(matches!(
            result.into_complete(),
            Err(WorkflowError::MaxIterationsExceeded { limit: 5 })
        ));
    }

    #[tokio::test]
    async fn test_graph_finishing_exactly_at_budget_is_complete() {
        let g = graph(
            Some("a"),
            vec![node("a", NodeKind::Prompt, None), node("b", NodeKind::Prompt, None)],
            vec![edge("a", "b", EdgeCondition::Always)],
        );
        let result = runner(Arc::new(Scripted::default()), 2)
            .execute(&g, "x", Map::new())
            .await
            .unwrap();
        assert!(result.is_complete());
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn test_routes_on_hint() {
        for (hint, expected) in [(Some("A"), "x"), (Some("B"), "y"), (Some("C"), "z"), (None, "z")] {
            let g = graph(
                Some("n"),
                vec![
                    node("n", NodeKind::Tool, Some("Classify")),
                    node("x", NodeKind::Prompt, None),
                    node("y", NodeKind::Prompt, None),
                    node("z", NodeKind::Prompt, None),
                ],
                vec![
                    edge("n", "x", EdgeCondition::Equals("A".to_string())),
                    edge("n", "y", EdgeCondition::Equals("B".to_string())),
                    edge("n", "z", EdgeCondition::Default),
                ],
            );
            let executor = Arc::new(Scripted::default().output("n", json!("label"), hint));
            let result = runner(executor, 10).execute(&g, "q", Map::new()).await.unwrap();

            let last = result.history.last().unwrap();
            assert_eq!(last.node_id.as_str(), expected, "hint {:?}", hint);
            assert_eq!(result.history[0].routing_hint.as_deref(), hint);
        }
    }

    #[tokio::test]
    async fn test_no_matching_edge_ends_at_node() {
        let g = graph(
            Some("n"),
            vec![node("n", NodeKind::Prompt, None), node("x", NodeKind::Prompt, None)],
            vec![edge("n", "x", EdgeCondition::Equals("A".to_string()))],
        );
        let executor = Arc::new(Scripted::default().output("n", json!("only me"), Some("B")));
        let result = runner(executor, 10).execute(&g, "q", Map::new()).await.unwrap();

        assert_eq!(result.iterations, 1);
        assert_eq!(result.response, "only me");
        assert_eq!(
            result.termination,
            Termination::NoMatchingEdge {
                node_id: NodeId::from("n")
            }
        );
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_executor_failure_aborts() {
        let g = graph(
            Some("a"),
            vec![
                node("a", NodeKind::Prompt, None),
                node("b", NodeKind::Tool, None),
                node("c", NodeKind::Prompt, None),
            ],
            vec![
                edge("a", "b", EdgeCondition::Always),
                edge("b", "c", EdgeCondition::Always),
            ],
        );
        let executor = Arc::new(Scripted::default().failing_on("b"));
        let result = runner(executor.clone(), 10)
            .execute(&g, "q", Map::new())
            .await;

        match result {
            Err(WorkflowError::NodeExecutionFailed { node_id, cause }) => {
                assert_eq!(node_id, "b");
                assert_eq!(cause.to_string(), "upstream timed out");
            }
            other => panic!("Expected NodeExecutionFailed, got {:?}", other),
        }
        assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_terminal_node_is_not_executed() {
        let g = graph(
            Some("a"),
            vec![node("a", NodeKind::Prompt, None), node("done", NodeKind::End, None)],
            vec![edge("a", "done", EdgeCondition::Always)],
        );
        let executor = Arc::new(Scripted::default().output("a", json!({"answer": "42"}), None));
        let result = runner(executor.clone(), 10)
            .execute(&g, "q", Map::new())
            .await
            .unwrap();

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.history.len(), 1);
        assert_eq!(result.response, "42");
        assert_eq!(
            result.termination,
            Termination::TerminalNode {
                node_id: NodeId::from("done")
            }
        );
    }

    #[tokio::test]
    async fn test_context_seeds_state_and_drives_expressions() {
        let expr = condition::parse("tier >= 2").unwrap();
        let g = graph(
            Some("start"),
            vec![
                node("start", NodeKind::Tool, Some("Start")),
                node("vip", NodeKind::TemplateResponse, None),
                node("std", NodeKind::TemplateResponse, None),
            ],
            vec![
                edge(
                    "start",
                    "vip",
                    EdgeCondition::Expression {
                        source: "tier >= 2".to_string(),
                        expr,
                    },
                ),
                edge("start", "std", EdgeCondition::Default),
            ],
        );

        let mut context = Map::new();
        context.insert("tier".to_string(), json!(3));
        let result = runner(Arc::new(Scripted::default()), 10)
            .execute(&g, "q", context)
            .await
            .unwrap();

        assert_eq!(result.history[1].node_id.as_str(), "vip");
        assert_eq!(result.history[0].input, json!({"tier": 3}));
        assert_eq!(result.state["tier"], json!(3));
        assert!(result.state.contains_key("start"));
    }

    #[tokio::test]
    async fn test_non_response_nodes_leave_response_empty() {
        let g = graph(Some("t"), vec![node("t", NodeKind::Tool, Some("Tool"))], vec![]);
        let result = runner(Arc::new(Scripted::default()), 10)
            .execute(&g, "q", Map::new())
            .await
            .unwrap();
        assert_eq!(result.response, "");
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn test_unknown_entry_ends_immediately() {
        let g = graph(Some("ghost"), vec![node("a", NodeKind::Prompt, None)], vec![]);
        let result = runner(Arc::new(Scripted::default()), 10)
            .execute(&g, "q", Map::new())
            .await
            .unwrap();
        assert_eq!(result.iterations, 0);
        assert_eq!(result.termination, Termination::EndOfGraph);
    }

    #[test]
    fn test_value_to_text() {
        assert_eq!(value_to_text(&json!("plain")), "plain");
        assert_eq!(value_to_text(&json!({"result": "done"})), "done");
        assert_eq!(value_to_text(&json!(["a", "b"])), "- a\n- b");
        assert_eq!(value_to_text(&json!({"k": 1})), "**k**: 1");
        assert_eq!(value_to_text(&Value::Null), "");
    }

    #[test]
    fn test_termination_serializes_with_reason() {
        let value = serde_json::to_value(Termination::MaxIterationsExceeded { limit: 3 }).unwrap();
        assert_eq!(value, json!({"reason": "max_iterations_exceeded", "limit": 3}));
    }
}
