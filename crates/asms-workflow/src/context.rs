//! Hierarchical execution context the variable resolver reads from.
//!
//! Only the engine mutates it: `steps[id]` is populated when that step
//! completes.

use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub input: Map<String, Value>,
    pub config: Map<String, Value>,
    pub steps: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new(input: Map<String, Value>, config: Map<String, Value>) -> Self {
        Self {
            input,
            config,
            steps: HashMap::new(),
        }
    }

    pub fn set_step_output(&mut self, step_id: impl Into<String>, output: Value) {
        self.steps.insert(step_id.into(), output);
    }

    pub fn step_output(&self, step_id: &str) -> Option<&Value> {
        self.steps.get(step_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn step_outputs_accumulate() {
        let mut ctx = ExecutionContext::default();
        assert!(ctx.step_output("a").is_none());
        ctx.set_step_output("a", json!({"text": "hi"}));
        assert_eq!(ctx.step_output("a").unwrap()["text"], "hi");
    }
}
