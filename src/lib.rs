// SPDX-License-Identifier: MIT

//! Switchyard stores conversational-agent workflows as flat rows, rebuilds
//! them into graphs and walks those graphs one node at a time.

pub mod config;
pub mod error;
pub mod executor;
pub mod store;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{StoreError, SwitchyardError, WorkflowError};
