//! Closed catalog of templated prompts and the minimal template renderer.
//!
//! Rendering supports two forms: `{{.name}}` substitution and
//! `{{if .name}}…{{end}}` conditional blocks. A missing required argument
//! fails the render; a missing optional argument elides its conditional
//! block entirely.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::protocol::{PromptArgument, PromptDescriptor};

static CONDITIONAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\{\{if \.([A-Za-z_][A-Za-z0-9_]*)\}\}(.*?)\{\{end\}\}")
        .expect("conditional pattern is valid")
});

static SUBSTITUTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\.([A-Za-z_][A-Za-z0-9_]*)\}\}").expect("substitution pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("missing required argument: {0}")]
    MissingArgument(String),
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: &'static [(&'static str, &'static str, bool)],
    pub template: &'static str,
}

/// The catalog is fixed at compile time.
pub const PROMPTS: &[PromptTemplate] = &[
    PromptTemplate {
        name: "design_workflow",
        description: "Draft a declarative workflow definition for a multi-step inference task",
        arguments: &[
            ("task", "What the workflow should accomplish", true),
            ("constraints", "Latency, cost, or hardware constraints", false),
        ],
        template: "Design a declarative workflow for the following task.\n\
Task: {{.task}}\n\
{{if .constraints}}Constraints: {{.constraints}}\n\
{{end}}Respond with a YAML definition: a `steps` list where each step has \
`id`, `type` (a registered unit name), `input` with `${...}` references, and \
`depends_on` where ordering matters.",
    },
    PromptTemplate {
        name: "diagnose_run",
        description: "Analyze a failed workflow run and suggest a fix",
        arguments: &[
            ("run_id", "Identifier of the failed run", true),
            ("logs", "Relevant log excerpts", false),
        ],
        template: "Workflow run {{.run_id}} failed.\n\
{{if .logs}}Log excerpts:\n{{.logs}}\n\
{{end}}Identify the failing step, the most likely root cause, and whether a \
retry policy or an `on_failure: continue` override would help.",
    },
    PromptTemplate {
        name: "summarize_capacity",
        description: "Summarize serving capacity across registered model deployments",
        arguments: &[("scope", "Restrict the summary to one domain", false)],
        template: "Summarize current serving capacity{{if .scope}} for {{.scope}}{{end}}. \
Call the model_list and engine_status tools first and base the summary on \
their output.",
    },
];

pub fn find(name: &str) -> Option<&'static PromptTemplate> {
    PROMPTS.iter().find(|p| p.name == name)
}

pub fn descriptors() -> Vec<PromptDescriptor> {
    PROMPTS
        .iter()
        .map(|p| PromptDescriptor {
            name: p.name.to_string(),
            description: p.description.to_string(),
            arguments: p
                .arguments
                .iter()
                .map(|(name, description, required)| PromptArgument {
                    name: name.to_string(),
                    description: description.to_string(),
                    required: *required,
                })
                .collect(),
        })
        .collect()
}

/// Renders a prompt with the supplied arguments.
pub fn render(prompt: &PromptTemplate, args: &Map<String, Value>) -> Result<String, PromptError> {
    for (name, _, required) in prompt.arguments {
        if *required && !has_value(args, name) {
            return Err(PromptError::MissingArgument((*name).to_string()));
        }
    }

    // Conditional blocks first: present arguments keep the block body,
    // absent ones drop it wholesale.
    let with_conditionals = CONDITIONAL_PATTERN.replace_all(prompt.template, |caps: &regex::Captures| {
        if has_value(args, &caps[1]) {
            caps[2].to_string()
        } else {
            String::new()
        }
    });

    let mut missing = None;
    let rendered = SUBSTITUTION_PATTERN.replace_all(&with_conditionals, |caps: &regex::Captures| {
        match args.get(&caps[1]) {
            Some(value) => stringify(value),
            None => {
                missing.get_or_insert_with(|| caps[1].to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(PromptError::MissingArgument(name)),
        None => Ok(rendered.into_owned()),
    }
}

fn has_value(args: &Map<String, Value>, name: &str) -> bool {
    match args.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn catalog_is_closed_and_named() {
        assert_eq!(PROMPTS.len(), 3);
        assert!(find("design_workflow").is_some());
        assert!(find("made_up").is_none());
    }

    #[test]
    fn substitution_fills_arguments() {
        let prompt = find("diagnose_run").unwrap();
        let rendered = render(prompt, &args(&[("run_id", "run-42")])).unwrap();
        assert!(rendered.contains("run-42"));
    }

    #[test]
    fn missing_required_argument_fails() {
        let prompt = find("design_workflow").unwrap();
        let err = render(prompt, &Map::new()).unwrap_err();
        assert!(matches!(err, PromptError::MissingArgument(name) if name == "task"));
    }

    #[test]
    fn missing_optional_argument_elides_the_block() {
        let prompt = find("design_workflow").unwrap();
        let rendered = render(prompt, &args(&[("task", "serve llama")])).unwrap();
        assert!(rendered.contains("serve llama"));
        assert!(!rendered.contains("Constraints:"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn present_optional_argument_keeps_the_block() {
        let prompt = find("design_workflow").unwrap();
        let rendered = render(
            prompt,
            &args(&[("task", "serve llama"), ("constraints", "one GPU")]),
        )
        .unwrap();
        assert!(rendered.contains("Constraints: one GPU"));
    }

    #[test]
    fn empty_string_counts_as_absent() {
        let prompt = find("summarize_capacity").unwrap();
        let rendered = render(prompt, &args(&[("scope", "")])).unwrap();
        assert!(!rendered.contains(" for "));
    }
}
