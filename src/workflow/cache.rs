// SPDX-License-Identifier: MIT

use crate::store::StoreId;
use crate::workflow::graph::AssembledGraph;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Entries {
    graphs: HashMap<String, Arc<AssembledGraph>>,
    /// Bumped by every invalidation, never reset
    generations: HashMap<String, u64>,
}

/// Assembled graph snapshots keyed by canonical workflow id
///
/// Snapshots are immutable once inserted. Clones share the same map, so the
/// lifecycle manager and the service see one cache.
#[derive(Clone, Default)]
pub struct GraphCache {
    entries: Arc<RwLock<Entries>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, workflow_id: &str) -> Option<Arc<AssembledGraph>> {
        let entries = self.entries.read().await;
        entries.graphs.get(&StoreId::parse(workflow_id).canonical()).cloned()
    }

    /// Invalidation count for a workflow; read it before assembling
    pub async fn generation(&self, workflow_id: &str) -> u64 {
        let entries = self.entries.read().await;
        entries
            .generations
            .get(&StoreId::parse(workflow_id).canonical())
            .copied()
            .unwrap_or(0)
    }

    pub async fn insert(&self, graph: Arc<AssembledGraph>) {
        let mut entries = self.entries.write().await;
        entries.graphs.insert(graph.workflow_id.clone(), graph);
    }

    /// Insert only if no invalidation happened since `generation` was read.
    /// Returns false when the snapshot was discarded.
    pub async fn insert_if_current(&self, graph: Arc<AssembledGraph>, generation: u64) -> bool {
        let mut entries = self.entries.write().await;
        let current = entries
            .generations
            .get(&graph.workflow_id)
            .copied()
            .unwrap_or(0);
        if current != generation {
            log::debug!(
                "Discarding graph for workflow {} assembled before a write",
                graph.workflow_id
            );
            return false;
        }
        entries.graphs.insert(graph.workflow_id.clone(), graph);
        true
    }

    pub async fn invalidate(&self, workflow_id: &str) {
        let key = StoreId::parse(workflow_id).canonical();
        let mut entries = self.entries.write().await;
        *entries.generations.entry(key.clone()).or_insert(0) += 1;
        if entries.graphs.remove(&key).is_some() {
            log::debug!("Evicted cached graph for workflow {}", workflow_id);
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.graphs.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.graphs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
