//! End-to-end engine scenarios: dependency interpolation, retry
//! exhaustion, failure policies, async execution, and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use asms_core::{ErrorInfo, RequestContext};
use asms_workflow::{
    ExecutionStatus, MemoryWorkflowStore, StepExecutor, StepStatus, WorkflowDefinition,
    WorkflowEngine, WorkflowStore,
};

/// Scripted executor: maps step types to canned outcomes and counts
/// invocations per step type.
struct ScriptedExecutor {
    outcomes: HashMap<String, Result<Value, ErrorInfo>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedExecutor {
    fn new() -> Self {
        Self {
            outcomes: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    fn succeed(mut self, step_type: &str, output: Value) -> Self {
        self.outcomes.insert(step_type.to_string(), Ok(output));
        self
    }

    fn fail(mut self, step_type: &str, error: ErrorInfo) -> Self {
        self.outcomes.insert(step_type.to_string(), Err(error));
        self
    }

    fn call_count(&self, step_type: &str) -> u32 {
        *self.calls.lock().unwrap().get(step_type).unwrap_or(&0)
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute_step(
        &self,
        _ctx: &RequestContext,
        step_type: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, ErrorInfo> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(step_type.to_string())
            .or_insert(0) += 1;

        match self.outcomes.get(step_type) {
            Some(Ok(output)) => {
                // Echo the resolved input back so tests can assert on it.
                let mut merged = output.as_object().cloned().unwrap_or_default();
                merged.insert("received".into(), Value::Object(input.clone()));
                Ok(Value::Object(merged))
            }
            Some(Err(error)) => Err(error.clone()),
            None => Err(ErrorInfo::unit_not_found(step_type)),
        }
    }
}

/// Executor that blocks until cancelled.
struct HangingExecutor;

#[async_trait]
impl StepExecutor for HangingExecutor {
    async fn execute_step(
        &self,
        _ctx: &RequestContext,
        _step_type: &str,
        _input: &Map<String, Value>,
    ) -> Result<Value, ErrorInfo> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(Value::Null)
    }
}

struct CountingExecutor {
    attempts: AtomicU32,
}

#[async_trait]
impl StepExecutor for CountingExecutor {
    async fn execute_step(
        &self,
        _ctx: &RequestContext,
        _step_type: &str,
        _input: &Map<String, Value>,
    ) -> Result<Value, ErrorInfo> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ErrorInfo::execution_failed("backend unavailable"))
    }
}

fn def_from_yaml(yaml: &str) -> WorkflowDefinition {
    WorkflowDefinition::from_yaml(yaml).expect("test definition parses")
}

#[tokio::test]
async fn dependency_outputs_flow_through_interpolation() {
    let def = def_from_yaml(
        r#"
name: transcribe-chat
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
output:
  final: "${steps.chat.content}"
"#,
    );

    let executor = Arc::new(
        ScriptedExecutor::new()
            .succeed("audio.transcribe", json!({"text": "hi"}))
            .succeed("chat.completion", json!({"content": "hello there"})),
    );
    let store = Arc::new(MemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(store.clone(), executor.clone());

    let input = json!({"file": "a.wav"}).as_object().cloned().unwrap();
    let result = engine.execute(&def, input).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);

    // The chat step received the transcribed text through interpolation.
    let chat = &result.step_results["chat"];
    assert_eq!(chat.status, StepStatus::Completed);
    let chat_output = chat.output.as_ref().unwrap();
    assert_eq!(chat_output["received"]["msg"], "hi");

    // The workflow output reflects the chat content.
    assert_eq!(result.output.as_ref().unwrap()["final"], "hello there");

    // The record is persisted in its terminal state.
    let stored = store.get_execution(&result.run_id).await.unwrap();
    assert_eq!(stored.status, ExecutionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn retry_exhaustion_aborts_the_run() {
    let def = def_from_yaml(
        r#"
name: flaky
steps:
  - id: only
    type: flaky.unit
    retry:
      max_attempts: 3
      delay_seconds: 1
    on_failure: abort
"#,
    );

    let executor = Arc::new(CountingExecutor {
        attempts: AtomicU32::new(0),
    });
    let engine = WorkflowEngine::new(Arc::new(MemoryWorkflowStore::new()), executor.clone());

    let result = engine.execute(&def, Map::new()).await.unwrap();

    assert_eq!(executor.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.status, ExecutionStatus::Failed);
    let step = &result.step_results["only"];
    assert_eq!(step.status, StepStatus::Failed);
    assert_eq!(step.attempts, 3);
    assert!(step.error.is_some());
    assert!(result.error.is_some());
}

#[tokio::test]
async fn on_failure_continue_proceeds_past_the_failure() {
    let def = def_from_yaml(
        r#"
name: tolerant
steps:
  - id: shaky
    type: shaky.unit
    on_failure: continue
  - id: solid
    type: solid.unit
"#,
    );

    let executor = Arc::new(
        ScriptedExecutor::new()
            .fail("shaky.unit", ErrorInfo::execution_failed("nope"))
            .succeed("solid.unit", json!({"done": true})),
    );
    let engine = WorkflowEngine::new(Arc::new(MemoryWorkflowStore::new()), executor.clone());

    let result = engine.execute(&def, Map::new()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.step_results["shaky"].status, StepStatus::Failed);
    assert_eq!(result.step_results["solid"].status, StepStatus::Completed);
    assert_eq!(executor.call_count("solid.unit"), 1);
}

#[tokio::test]
async fn abort_skips_remaining_steps() {
    let def = def_from_yaml(
        r#"
name: brittle
steps:
  - id: first
    type: bad.unit
  - id: second
    type: never.unit
    depends_on: [first]
"#,
    );

    let executor = Arc::new(
        ScriptedExecutor::new().fail("bad.unit", ErrorInfo::execution_failed("broken")),
    );
    let engine = WorkflowEngine::new(Arc::new(MemoryWorkflowStore::new()), executor.clone());

    let result = engine.execute(&def, Map::new()).await.unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.step_results.contains_key("first"));
    // The dependent step was never reached, so it has no entry.
    assert!(!result.step_results.contains_key("second"));
    assert_eq!(executor.call_count("never.unit"), 0);
}

#[tokio::test]
async fn invalid_definition_fails_without_touching_the_store() {
    let def = def_from_yaml(
        r#"
name: cyclic
steps:
  - id: a
    type: t.a
    depends_on: [b]
  - id: b
    type: t.b
    depends_on: [a]
"#,
    );

    let store = Arc::new(MemoryWorkflowStore::new());
    let engine = WorkflowEngine::new(store.clone(), Arc::new(ScriptedExecutor::new()));

    let err = engine.execute(&def, Map::new()).await.unwrap_err();
    assert_eq!(err.code, asms_core::codes::VALIDATION_FAILED);
    assert!(store.list_executions(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn async_execution_returns_running_then_completes() {
    let def = def_from_yaml(
        r#"
name: quick
steps:
  - id: only
    type: quick.unit
"#,
    );

    let executor =
        Arc::new(ScriptedExecutor::new().succeed("quick.unit", json!({"ok": true})));
    let store = Arc::new(MemoryWorkflowStore::new());
    let engine = Arc::new(WorkflowEngine::new(store.clone(), executor));

    let initial = engine.execute_async(def, Map::new()).await.unwrap();
    assert_eq!(initial.status, ExecutionStatus::Running);
    assert!(!initial.run_id.is_empty());

    // Poll the store until the background task lands the terminal state.
    let mut status = initial.status;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = store.get_execution(&initial.run_id).await.unwrap().status;
        if status.is_terminal() {
            break;
        }
    }
    assert_eq!(status, ExecutionStatus::Completed);
    assert!(!engine.is_live(&initial.run_id));
}

#[tokio::test]
async fn cancel_stops_the_in_flight_step() {
    let def = def_from_yaml(
        r#"
name: long
steps:
  - id: stuck
    type: slow.unit
"#,
    );

    let store = Arc::new(MemoryWorkflowStore::new());
    let engine = Arc::new(WorkflowEngine::new(store.clone(), Arc::new(HangingExecutor)));

    let initial = engine.execute_async(def, Map::new()).await.unwrap();

    // Wait for the run to appear live, then cancel it.
    for _ in 0..50 {
        if engine.is_live(&initial.run_id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(engine.cancel(&initial.run_id));

    let mut status = ExecutionStatus::Running;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = store.get_execution(&initial.run_id).await.unwrap().status;
        if status.is_terminal() {
            break;
        }
    }
    assert_eq!(status, ExecutionStatus::Cancelled);

    // Entries exist only for steps that were started.
    let stored = store.get_execution(&initial.run_id).await.unwrap();
    assert_eq!(stored.step_results["stuck"].status, StepStatus::Cancelled);

    // Cancel is idempotent once the run has retired.
    assert!(!engine.cancel(&initial.run_id));
}
