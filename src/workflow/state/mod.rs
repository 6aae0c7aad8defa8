// SPDX-License-Identifier: MIT

//! Execution state for graph traversal
//!
//! `ExecutionState` is the key/value store threaded through one run: seeded
//! from the caller's context, then written by each node that has an output key.

mod store;

pub use store::ExecutionState;
