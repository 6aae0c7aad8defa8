// SPDX-License-Identifier: MIT

pub mod cache;
pub mod condition;
pub mod graph;
pub mod lifecycle;
pub mod loader;
pub mod service;
pub mod state;
pub mod types;

pub use cache::GraphCache;
pub use lifecycle::LifecycleManager;
pub use loader::WorkflowLoader;
pub use service::{ExecutionReport, WorkflowService};
pub use types::{EdgeDefinition, NodeDefinition, PromptDefinition, WorkflowDefinition, WorkflowPatch};
