// SPDX-License-Identifier: MIT

//! Typed error handling for switchyard
//!
//! Storage, assembly and execution each get their own error enum. The
//! top-level `SwitchyardError` is what the binary and embedding callers see.

use thiserror::Error;

/// Boxed error returned by node executors
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type for switchyard
#[derive(Debug, Error)]
pub enum SwitchyardError {
    /// Configuration errors (invalid env vars, bad flags)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workflow assembly, lifecycle and execution errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Persistence-layer errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Workflow-specific errors
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No workflow with this id exists in the store
    #[error("Workflow {0} not found")]
    WorkflowNotFound(String),

    /// Stored node configuration could not be parsed into a mapping
    #[error("Malformed configuration for node {node_id}: {reason}")]
    MalformedNodeConfig { node_id: String, reason: String },

    /// Stored edge condition expression could not be parsed
    #[error("Malformed condition on edge {source_id} -> {target_id}: {reason}")]
    MalformedEdgeCondition {
        source_id: String,
        target_id: String,
        reason: String,
    },

    /// The node executor failed; traversal was aborted
    #[error("Node {node_id} failed: {cause}")]
    NodeExecutionFailed {
        node_id: String,
        #[source]
        cause: BoxError,
    },

    /// Iteration budget exhausted before the graph terminated
    #[error("Max iterations reached: {limit}")]
    MaxIterationsExceeded { limit: u32 },

    /// Definition rejected by lifecycle validation
    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    /// Uniform failure surfaced at the execution entry point
    #[error("{message}")]
    ExecutionFailed { workflow_id: String, message: String },

    /// Caller-level timeout elapsed; execution state was discarded
    #[error("Workflow {workflow_id} timed out after {seconds}s")]
    Timeout { workflow_id: String, seconds: u64 },

    /// Persistence failure, propagated unchanged
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Graph store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be mapped into its row type
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A write collided with an existing row
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl SwitchyardError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl WorkflowError {
    pub fn malformed_config(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedNodeConfig {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidDefinition(message.into())
    }

    /// True when the error means the workflow does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkflowNotFound(_))
    }
}

impl From<&str> for SwitchyardError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for SwitchyardError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
