// SPDX-License-Identifier: MIT

//! Execution entry point
//!
//! Assembles (or fetches from cache) the workflow's graph, runs it under the
//! configured timeout and reports the outcome. Failures other than a missing
//! workflow or a timeout are flattened into `WorkflowError::ExecutionFailed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};

use super::cache::GraphCache;
use super::graph::{
    AssembledGraph, ExecutionResult, GraphAssembler, HistoryEntry, Termination, WorkflowRunner,
};
use crate::config::EngineConfig;
use crate::error::WorkflowError;
use crate::executor::NodeExecutor;
use crate::store::GraphStore;

/// What callers get back from one execution
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub workflow_id: String,
    pub response: String,
    pub execution_time_seconds: f64,
    pub history: Vec<HistoryEntry>,
    pub iterations: u32,
    pub state: Map<String, Value>,
    /// False when the iteration budget cut the run short
    pub completed: bool,
    pub termination: Termination,
}

impl ExecutionReport {
    fn new(workflow_id: String, result: ExecutionResult, elapsed: Duration) -> Self {
        Self {
            workflow_id,
            completed: result.is_complete(),
            response: result.response,
            execution_time_seconds: elapsed.as_secs_f64(),
            history: result.history,
            iterations: result.iterations,
            state: result.state,
            termination: result.termination,
        }
    }
}

pub struct WorkflowService {
    assembler: GraphAssembler,
    runner: WorkflowRunner,
    timeout: Option<Duration>,
    cache: Option<GraphCache>,
}

impl WorkflowService {
    pub fn new(
        store: Arc<dyn GraphStore>,
        executor: Arc<dyn NodeExecutor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            assembler: GraphAssembler::new(store),
            runner: WorkflowRunner::new(executor, config.max_iterations),
            timeout: config.timeout,
            cache: config.cache_graphs.then(GraphCache::new),
        }
    }

    /// Replace the cache, e.g. with one shared by a `LifecycleManager`
    pub fn with_cache(mut self, cache: GraphCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache(&self) -> Option<&GraphCache> {
        self.cache.as_ref()
    }

    /// Assembled graph for a workflow, from cache when enabled
    ///
    /// A graph assembled while a lifecycle write invalidated the workflow is
    /// still returned to this caller but not cached.
    pub async fn graph(&self, workflow_id: &str) -> Result<Arc<AssembledGraph>, WorkflowError> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::new(self.assembler.assemble(workflow_id).await?));
        };

        if let Some(graph) = cache.get(workflow_id).await {
            log::debug!("Using cached graph for workflow {}", workflow_id);
            return Ok(graph);
        }

        let generation = cache.generation(workflow_id).await;
        let graph = Arc::new(self.assembler.assemble(workflow_id).await?);
        cache.insert_if_current(graph.clone(), generation).await;
        Ok(graph)
    }

    /// Run a workflow against one conversational turn
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        input: &str,
        context: Option<Map<String, Value>>,
    ) -> Result<ExecutionReport, WorkflowError> {
        let started = Instant::now();
        let run = async {
            let graph = self.graph(workflow_id).await?;
            self.runner
                .execute(&graph, input, context.unwrap_or_default())
                .await
        };

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::error!(
                        "Workflow {} timed out after {:?}",
                        workflow_id,
                        limit
                    );
                    return Err(WorkflowError::Timeout {
                        workflow_id: workflow_id.to_string(),
                        seconds: limit.as_secs(),
                    });
                }
            },
            None => run.await,
        };

        let result = outcome.map_err(|e| match e {
            WorkflowError::WorkflowNotFound(_) => e,
            other => {
                log::error!("Workflow {} failed: {}", workflow_id, other);
                WorkflowError::ExecutionFailed {
                    workflow_id: workflow_id.to_string(),
                    message: format!("Workflow execution failed: {}", other),
                }
            }
        })?;

        let elapsed = started.elapsed();
        log::info!(
            "Workflow {} completed in {:.3}s ({} iterations)",
            workflow_id,
            elapsed.as_secs_f64(),
            result.iterations
        );
        Ok(ExecutionReport::new(workflow_id.to_string(), result, elapsed))
    }
}
