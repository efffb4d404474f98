//! Workflow definition model and YAML/JSON parsing.
//!
//! Both syntaxes normalize to the same internal form: `on_failure` defaults
//! to `abort`, `depends_on` to an empty list, and `config`/`output` to
//! empty maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validator::ValidationError;

/// What to do when a step has exhausted its retry budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Abort,
    Continue,
    /// Exhausted retries behave exactly like [`OnFailure::Abort`].
    Retry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub delay_seconds: u64,
}

fn default_max_attempts() -> u32 {
    1
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,

    /// Unit name the step dispatches to, e.g. `audio.transcribe`.
    #[serde(rename = "type")]
    pub step_type: String,

    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub on_failure: OnFailure,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub config: Map<String, Value>,

    pub steps: Vec<WorkflowStep>,

    /// Output mapping resolved against the final execution context.
    #[serde(default)]
    pub output: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn from_yaml(source: &str) -> Result<Self, ValidationError> {
        serde_yaml::from_str(source).map_err(|e| ValidationError::Parse {
            message: e.to_string(),
        })
    }

    pub fn from_json(source: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(source).map_err(|e| ValidationError::Parse {
            message: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, ValidationError> {
        serde_yaml::to_string(self).map_err(|e| ValidationError::Parse {
            message: e.to_string(),
        })
    }

    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const YAML_DEF: &str = r#"
name: transcribe-and-chat
description: Transcribe audio then chat about it
config:
  language: en
steps:
  - id: transcribe
    type: audio.transcribe
    input:
      file: "${input.file}"
  - id: chat
    type: chat.completion
    input:
      msg: "${steps.transcribe.text}"
    depends_on: [transcribe]
    on_failure: continue
    retry:
      max_attempts: 3
      delay_seconds: 1
output:
  final: "${steps.chat.content}"
"#;

    #[test]
    fn yaml_parses_with_normalized_defaults() {
        let def = WorkflowDefinition::from_yaml(YAML_DEF).unwrap();
        assert_eq!(def.name, "transcribe-and-chat");
        assert_eq!(def.steps.len(), 2);

        let transcribe = &def.steps[0];
        assert_eq!(transcribe.on_failure, OnFailure::Abort);
        assert!(transcribe.depends_on.is_empty());
        assert!(transcribe.retry.is_none());

        let chat = &def.steps[1];
        assert_eq!(chat.on_failure, OnFailure::Continue);
        assert_eq!(chat.depends_on, vec!["transcribe"]);
        assert_eq!(chat.retry.as_ref().unwrap().max_attempts, 3);
    }

    #[test]
    fn yaml_round_trip_preserves_definition() {
        let def = WorkflowDefinition::from_yaml(YAML_DEF).unwrap();
        let reparsed = WorkflowDefinition::from_yaml(&def.to_yaml().unwrap()).unwrap();
        assert_eq!(def, reparsed);
    }

    #[test]
    fn json_round_trip_preserves_definition() {
        let def = WorkflowDefinition::from_yaml(YAML_DEF).unwrap();
        let encoded = serde_json::to_string(&def).unwrap();
        let reparsed = WorkflowDefinition::from_json(&encoded).unwrap();
        assert_eq!(def, reparsed);
    }

    #[test]
    fn json_and_yaml_normalize_to_same_form() {
        let json_def = WorkflowDefinition::from_json(
            &json!({
                "name": "w",
                "steps": [{"id": "a", "type": "t.x"}]
            })
            .to_string(),
        )
        .unwrap();
        let yaml_def = WorkflowDefinition::from_yaml("name: w\nsteps:\n  - id: a\n    type: t.x\n").unwrap();
        assert_eq!(json_def, yaml_def);
        assert!(json_def.config.is_empty());
        assert!(json_def.output.is_empty());
    }

    #[test]
    fn missing_name_fails_to_parse() {
        assert!(WorkflowDefinition::from_yaml("steps:\n  - id: a\n    type: t\n").is_err());
    }

    #[test]
    fn unknown_on_failure_fails_to_parse() {
        let result = WorkflowDefinition::from_yaml(
            "name: w\nsteps:\n  - id: a\n    type: t\n    on_failure: explode\n",
        );
        assert!(result.is_err());
    }
}
