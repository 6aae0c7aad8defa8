// SPDX-License-Identifier: MIT

//! Runtime state storage for workflow execution

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Accumulated key/value state of a single execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionState {
    fields: HashMap<String, Value>,
}

impl ExecutionState {
    /// Create an empty ExecutionState
    pub fn empty() -> Self {
        Self::default()
    }

    /// Seed state from caller-supplied context
    pub fn from_context(context: Map<String, Value>) -> Self {
        Self {
            fields: context.into_iter().collect(),
        }
    }

    /// Write a value, replacing whatever the key held
    pub fn update(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Get a field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Get a nested field value using dot notation (e.g., "result.intent")
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Convert state to a JSON object
    pub fn to_json(&self) -> Value {
        Value::Object(self.to_map())
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields.into_iter().collect()
    }

    /// Get all field names
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
