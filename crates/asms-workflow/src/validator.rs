//! Structural validation and topological ordering of workflow DAGs.
//!
//! Validation and the Kahn sort must agree: a definition that validates
//! always sorts, and the sort's leftover-node check is only a safety net,
//! never the primary cycle detector.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::{WorkflowDefinition, WorkflowStep};

static VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("variable pattern is valid"));

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("failed to parse workflow definition: {message}")]
    Parse { message: String },

    #[error("workflow definition is invalid: {0}")]
    Invalid(String),

    #[error("dependency cycle detected: {path}")]
    Cycle { path: String },
}

impl From<ValidationError> for asms_core::ErrorInfo {
    fn from(err: ValidationError) -> Self {
        asms_core::ErrorInfo::validation_failed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Joins every issue into one message, for callers that need a single
    /// error value.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates a definition. Checks run in order: structure, dependency
/// integrity, cycles, variable references.
pub fn validate(def: &WorkflowDefinition) -> ValidationResult {
    let mut result = ValidationResult::default();

    check_structure(def, &mut result);
    let ids = check_dependencies(def, &mut result);
    check_cycles(def, &ids, &mut result);
    check_references(def, &ids, &mut result);

    result.valid = result.errors.is_empty();
    result
}

fn check_structure(def: &WorkflowDefinition, result: &mut ValidationResult) {
    if def.steps.is_empty() {
        result.push("steps", "workflow must declare at least one step");
    }
    for (index, step) in def.steps.iter().enumerate() {
        if step.id.trim().is_empty() {
            result.push(format!("steps[{}].id", index), "step id must not be empty");
        }
        if step.step_type.trim().is_empty() {
            result.push(
                format!("steps[{}].type", index),
                "step type must not be empty",
            );
        }
    }
}

fn check_dependencies(def: &WorkflowDefinition, result: &mut ValidationResult) -> HashSet<String> {
    let mut ids = HashSet::new();
    for step in &def.steps {
        if !ids.insert(step.id.clone()) {
            result.push(
                format!("steps.{}", step.id),
                format!("duplicate step id: {}", step.id),
            );
        }
    }

    for step in &def.steps {
        for dep in &step.depends_on {
            if dep == &step.id {
                result.push(
                    format!("steps.{}.depends_on", step.id),
                    "step cannot depend on itself",
                );
            } else if !ids.contains(dep) {
                result.push(
                    format!("steps.{}.depends_on", step.id),
                    format!("unknown dependency: {}", dep),
                );
            }
        }
    }
    ids
}

/// DFS with an explicit recursion stack. On detection the error names the
/// cycle path.
fn check_cycles(def: &WorkflowDefinition, ids: &HashSet<String>, result: &mut ValidationResult) {
    let adjacency: HashMap<&str, Vec<&str>> = def
        .steps
        .iter()
        .map(|step| {
            let deps = step
                .depends_on
                .iter()
                .filter(|d| ids.contains(*d) && *d != &step.id)
                .map(String::as_str)
                .collect();
            (step.id.as_str(), deps)
        })
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    fn dfs<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<String> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        if let Some(deps) = adjacency.get(node) {
            for dep in deps {
                if on_stack.contains(dep) {
                    // Close the loop for the error message.
                    let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut path: Vec<&str> = stack[start..].to_vec();
                    path.push(dep);
                    return Some(path.join(" -> "));
                }
                if !visited.contains(dep) {
                    if let Some(path) = dfs(*dep, adjacency, visited, stack, on_stack) {
                        return Some(path);
                    }
                }
            }
        }

        stack.pop();
        on_stack.remove(node);
        None
    }

    for step in &def.steps {
        if !visited.contains(step.id.as_str()) {
            if let Some(path) = dfs(
                step.id.as_str(),
                &adjacency,
                &mut visited,
                &mut stack,
                &mut on_stack,
            ) {
                result.push("steps", format!("dependency cycle: {}", path));
                return;
            }
        }
    }
}

/// Variable references in step inputs and the workflow output may only name
/// `input`, `config`, or an existing step id.
fn check_references(def: &WorkflowDefinition, ids: &HashSet<String>, result: &mut ValidationResult) {
    for step in &def.steps {
        for (key, value) in &step.input {
            scan_references(
                value,
                ids,
                &format!("steps.{}.input.{}", step.id, key),
                result,
            );
        }
    }
    for (key, value) in &def.output {
        scan_references(value, ids, &format!("output.{}", key), result);
    }
}

fn scan_references(
    value: &Value,
    ids: &HashSet<String>,
    field: &str,
    result: &mut ValidationResult,
) {
    match value {
        Value::String(s) => {
            for captures in VAR_PATTERN.captures_iter(s) {
                let reference = &captures[1];
                let mut segments = reference.split('.');
                match segments.next().unwrap_or_default() {
                    "input" | "config" => {}
                    "steps" => match segments.next() {
                        Some(step_id) if ids.contains(step_id) => {}
                        Some(step_id) => result.push(
                            field,
                            format!("reference to unknown step: {} in ${{{}}}", step_id, reference),
                        ),
                        None => result
                            .push(field, format!("malformed step reference: ${{{}}}", reference)),
                    },
                    other => result.push(
                        field,
                        format!("unknown variable source: {} in ${{{}}}", other, reference),
                    ),
                }
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                scan_references(item, ids, &format!("{}.{}", field, key), result);
            }
        }
        Value::Array(items) => {
            for item in items {
                scan_references(item, ids, field, result);
            }
        }
        _ => {}
    }
}

/// Kahn's algorithm. Returns step ids with every step after all of its
/// dependencies. A leftover node means a cycle survived validation, which
/// is reported rather than looped on.
pub fn topological_sort(def: &WorkflowDefinition) -> Result<Vec<String>, ValidationError> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut successors: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in &def.steps {
        in_degree.entry(step.id.as_str()).or_insert(0);
        for dep in &step.depends_on {
            *in_degree.entry(step.id.as_str()).or_insert(0) += 1;
            successors
                .entry(dep.as_str())
                .or_default()
                .push(step.id.as_str());
        }
    }

    // Seed in definition order so independent steps keep a stable order.
    let mut queue: VecDeque<&str> = def
        .steps
        .iter()
        .filter(|s| in_degree.get(s.id.as_str()) == Some(&0))
        .map(|s| s.id.as_str())
        .collect();

    let mut order = Vec::with_capacity(def.steps.len());
    while let Some(node) = queue.pop_front() {
        order.push(node.to_string());
        if let Some(next) = successors.get(node) {
            for succ in next {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }
    }

    if order.len() != def.steps.len() {
        let stuck: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(id, _)| *id)
            .collect();
        return Err(ValidationError::Cycle {
            path: stuck.join(", "),
        });
    }
    Ok(order)
}
