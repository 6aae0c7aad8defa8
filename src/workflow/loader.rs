// SPDX-License-Identifier: MIT

//! Workflow loader - YAML/JSON definition files

use super::types::WorkflowDefinition;
use crate::error::SwitchyardError;
use std::fs;
use std::path::Path;

/// Loads workflow definitions from disk
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a definition; `.json` files are parsed as JSON, everything else as YAML
    pub fn load_definition<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<WorkflowDefinition, SwitchyardError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        log::debug!("Loading workflow definition from {}", path.display());
        if is_json {
            Self::parse_json(&content)
        } else {
            Self::parse_yaml(&content)
        }
    }

    pub fn parse_yaml(content: &str) -> Result<WorkflowDefinition, SwitchyardError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn parse_json(content: &str) -> Result<WorkflowDefinition, SwitchyardError> {
        Ok(serde_json::from_str(content)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SUPPORT_YAML: &str = r#"
name: Support Router
description: "Routes support questions"
entry_node: classify

prompts:
  - id: greet-prompt
    content: "You are a friendly support agent."

nodes:
  - id: classify
    kind: tool
    name: Intent
    function: classify_intent
    config:
      labels: [refund, shipping]
  - id: refund
    kind: template_response
    name: Refund Reply
    template: "Refund for {{ input }}"
  - id: fallback
    type: prompt
    prompt_id: greet-prompt

edges:
  - source: classify
    target: refund
    condition: refund
  - source: classify
    target: fallback
    condition_type: default
"#;

    #[test]
    fn test_parse_graph_definition() {
        let def = WorkflowLoader::parse_yaml(SUPPORT_YAML).unwrap();
        assert_eq!(def.name, "Support Router");
        assert_eq!(def.entry_node.as_deref(), Some("classify"));
        assert_eq!(def.nodes.len(), 3);
        assert_eq!(def.nodes[0].function.as_deref(), Some("classify_intent"));
        assert_eq!(def.nodes[2].kind, "prompt");
        assert_eq!(def.edges[0].condition.as_deref(), Some("refund"));
        assert_eq!(def.edges[1].condition_type.as_deref(), Some("default"));
        assert_eq!(def.prompts[0].id, "greet-prompt");
    }

    #[test]
    fn test_minimal_definition() {
        let def = WorkflowLoader::parse_yaml("name: Empty").unwrap();
        assert!(def.nodes.is_empty());
        assert!(def.entry_node.is_none());
        assert_eq!(def.description, "");
    }

    #[test]
    fn test_parse_json() {
        let def = WorkflowLoader::parse_json(
            r#"{"name": "j", "entry_node": "a", "nodes": [{"id": "a", "kind": "prompt"}]}"#,
        )
        .unwrap();
        assert_eq!(def.nodes[0].id, "a");
    }

    #[test]
    fn test_parse_error_is_typed() {
        let result = WorkflowLoader::parse_yaml("nodes: [");
        assert!(matches!(result, Err(SwitchyardError::Yaml(_))));
    }

    #[test]
    fn test_load_json_file_by_extension() {
        let path = std::env::temp_dir().join(format!("switchyard-{}.json", uuid::Uuid::new_v4()));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(br#"{"name": "from disk"}"#).unwrap();

        let def = WorkflowLoader::new().load_definition(&path).unwrap();
        assert_eq!(def.name, "from disk");
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file() {
        let result = WorkflowLoader::new().load_definition("/definitely/not/here.yaml");
        assert!(matches!(result, Err(SwitchyardError::Io(_))));
    }
}
