// SPDX-License-Identifier: MIT

//! Workflow graphs: assembly from stored rows and traversal

mod assembler;
mod runner;
mod types;

pub(crate) use assembler::{resolve_condition, resolve_config};
pub use assembler::{GraphAssembler, TEMPLATE_KEY};
pub use runner::{value_to_text, ExecutionResult, HistoryEntry, Termination, WorkflowRunner};
pub use types::{
    derive_output_key, AssembledGraph, Edge, EdgeCondition, Node, NodeId, NodeKind, TOOL_NAME_KEY,
};
