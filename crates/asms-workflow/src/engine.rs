//! # Workflow Engine
//!
//! Executes validated definitions: schedules steps in topological order,
//! resolves inputs against the execution context, applies per-step retry
//! policies, honors `on_failure`, and persists execution records through
//! the store contract.
//!
//! The engine never depends on the gateway directly; step execution goes
//! through an injected [`StepExecutor`] so the assembled system can route
//! steps back through the gateway while tests plug in stubs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use asms_core::{ErrorInfo, RequestContext};

use crate::context::ExecutionContext;
use crate::definition::{OnFailure, WorkflowDefinition, WorkflowStep};
use crate::resolver::resolve_map;
use crate::store::WorkflowStore;
use crate::validator::{topological_sort, validate};

/// Run states. `pending → running → (completed | failed | cancelled)`;
/// terminal states are never revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepResult {
    fn started(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Running,
            output: None,
            error: None,
            attempts: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }

    fn fail(&mut self, error: ErrorInfo) {
        self.status = StepStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    fn cancel(&mut self) {
        self.status = StepStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub workflow_id: String,
    pub run_id: String,
    pub status: ExecutionStatus,
    pub step_results: HashMap<String, StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ExecutionResult {
    pub fn started(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            status: ExecutionStatus::Running,
            step_results: HashMap::new(),
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        }
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        let completed = Utc::now();
        self.completed_at = Some(completed);
        self.duration_ms = Some(
            (completed - self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
    }
}

/// Executes one step. The assembled system routes through the gateway as
/// either command or query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(
        &self,
        ctx: &RequestContext,
        step_type: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, ErrorInfo>;
}

pub struct WorkflowEngine {
    store: Arc<dyn WorkflowStore>,
    executor: Arc<dyn StepExecutor>,
    live: Mutex<HashMap<String, CancellationToken>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn WorkflowStore>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            store,
            executor,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Runs a definition to completion. Invalid definitions fail before
    /// anything is persisted.
    pub async fn execute(
        &self,
        def: &WorkflowDefinition,
        input: Map<String, Value>,
    ) -> Result<ExecutionResult, ErrorInfo> {
        let (run_id, token) = self.admit(def)?;
        let result = self.run(def, input, &run_id, &token).await;
        self.retire(&run_id);
        result
    }

    /// Returns immediately with a `running` record; execution proceeds on a
    /// background task.
    pub async fn execute_async(
        self: &Arc<Self>,
        def: WorkflowDefinition,
        input: Map<String, Value>,
    ) -> Result<ExecutionResult, ErrorInfo> {
        let (run_id, token) = self.admit(&def)?;
        let initial = ExecutionResult::started(def.name.clone(), run_id.clone());
        self.store
            .save_execution(&initial)
            .await
            .map_err(ErrorInfo::from)?;

        let engine = Arc::clone(self);
        let background_run_id = run_id.clone();
        tokio::spawn(async move {
            if let Err(err) = engine
                .run(&def, input, &background_run_id, &token)
                .await
            {
                warn!(run_id = %background_run_id, error = %err, "background workflow run failed");
            }
            engine.retire(&background_run_id);
        });

        Ok(initial)
    }

    /// Cancels a live run. Idempotent: cancelling an unknown or finished
    /// run is a no-op.
    pub fn cancel(&self, run_id: &str) -> bool {
        let live = self.live.lock().expect("live-runs lock poisoned");
        match live.get(run_id) {
            Some(token) => {
                info!(run_id, "cancelling workflow run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, run_id: &str) -> bool {
        self.live
            .lock()
            .expect("live-runs lock poisoned")
            .contains_key(run_id)
    }

    fn admit(&self, def: &WorkflowDefinition) -> Result<(String, CancellationToken), ErrorInfo> {
        let validation = validate(def);
        if !validation.valid {
            return Err(ErrorInfo::validation_failed(validation.summary())
                .with_details(json!({ "errors": validation.errors })));
        }
        let run_id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.live
            .lock()
            .expect("live-runs lock poisoned")
            .insert(run_id.clone(), token.clone());
        Ok((run_id, token))
    }

    fn retire(&self, run_id: &str) {
        self.live
            .lock()
            .expect("live-runs lock poisoned")
            .remove(run_id);
    }

    async fn run(
        &self,
        def: &WorkflowDefinition,
        input: Map<String, Value>,
        run_id: &str,
        token: &CancellationToken,
    ) -> Result<ExecutionResult, ErrorInfo> {
        let mut result = ExecutionResult::started(def.name.clone(), run_id);
        self.store
            .save_execution(&result)
            .await
            .map_err(ErrorInfo::from)?;

        // Validation already rejected cycles; the sort is a safety net.
        let order = topological_sort(def).map_err(ErrorInfo::from)?;
        let mut ctx = ExecutionContext::new(input, def.config.clone());
        let request_ctx = RequestContext::with_token(None, token.clone());

        info!(run_id, workflow = %def.name, steps = order.len(), "workflow run started");

        for step_id in &order {
            let step = match def.step(step_id) {
                Some(step) => step,
                None => continue,
            };

            if token.is_cancelled() {
                result.finish(ExecutionStatus::Cancelled);
                self.persist(&result).await?;
                return Ok(result);
            }

            let mut step_result = StepResult::started(&step.id);
            let outcome = self
                .run_step(step, &ctx, &request_ctx, token, &mut step_result)
                .await;

            match outcome {
                StepOutcome::Completed(output) => {
                    ctx.set_step_output(&step.id, output.clone());
                    step_result.complete(output);
                    result.step_results.insert(step.id.clone(), step_result);
                }
                StepOutcome::Cancelled => {
                    step_result.cancel();
                    result.step_results.insert(step.id.clone(), step_result);
                    result.finish(ExecutionStatus::Cancelled);
                    self.persist(&result).await?;
                    return Ok(result);
                }
                StepOutcome::Failed(error) => {
                    warn!(run_id, step = %step.id, code = %error.code, "step failed");
                    step_result.fail(error.clone());
                    result.step_results.insert(step.id.clone(), step_result);

                    match step.on_failure {
                        OnFailure::Continue => continue,
                        // Exhausted retries behave exactly like abort.
                        OnFailure::Abort | OnFailure::Retry => {
                            result.error = Some(error);
                            result.finish(ExecutionStatus::Failed);
                            self.persist(&result).await?;
                            return Ok(result);
                        }
                    }
                }
            }
        }

        match resolve_map(&def.output, &ctx) {
            Ok(output) => {
                result.output = Some(Value::Object(output));
                result.finish(ExecutionStatus::Completed);
            }
            Err(err) => {
                result.error = Some(err.into());
                result.finish(ExecutionStatus::Failed);
            }
        }

        self.persist(&result).await?;
        info!(run_id, status = ?result.status, "workflow run finished");
        Ok(result)
    }

    async fn run_step(
        &self,
        step: &WorkflowStep,
        ctx: &ExecutionContext,
        request_ctx: &RequestContext,
        token: &CancellationToken,
        step_result: &mut StepResult,
    ) -> StepOutcome {
        let resolved = match resolve_map(&step.input, ctx) {
            Ok(resolved) => resolved,
            Err(err) => return StepOutcome::Failed(err.into()),
        };

        let max_attempts = step
            .retry
            .as_ref()
            .map(|r| r.max_attempts.max(1))
            .unwrap_or(1);
        let delay = Duration::from_secs(
            step.retry.as_ref().map(|r| r.delay_seconds).unwrap_or(0),
        );

        let mut last_error = ErrorInfo::internal("step never attempted");
        for attempt in 1..=max_attempts {
            step_result.attempts = attempt;
            debug!(step = %step.id, attempt, "executing step");

            let execution = self
                .executor
                .execute_step(request_ctx, &step.step_type, &resolved);
            tokio::select! {
                _ = token.cancelled() => return StepOutcome::Cancelled,
                outcome = execution => match outcome {
                    Ok(output) => return StepOutcome::Completed(output),
                    Err(err) => last_error = err,
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    _ = token.cancelled() => return StepOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        StepOutcome::Failed(last_error)
    }

    async fn persist(&self, result: &ExecutionResult) -> Result<(), ErrorInfo> {
        self.store
            .save_execution(result)
            .await
            .map_err(ErrorInfo::from)
    }
}

enum StepOutcome {
    Completed(Value),
    Failed(ErrorInfo),
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::WorkflowStep;
    use crate::store::MemoryWorkflowStore;

    fn single_step_def() -> WorkflowDefinition {
        WorkflowDefinition {
            name: "single".into(),
            description: String::new(),
            config: Map::new(),
            steps: vec![WorkflowStep {
                id: "only".into(),
                step_type: "unit.only".into(),
                input: Map::new(),
                depends_on: vec![],
                on_failure: OnFailure::Abort,
                retry: None,
            }],
            output: Map::new(),
        }
    }

    #[tokio::test]
    async fn completed_runs_are_terminal_and_retired() {
        let mut executor = MockStepExecutor::new();
        executor
            .expect_execute_step()
            .returning(|_, _, _| Ok(json!({"ok": true})));

        let engine = WorkflowEngine::new(
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(executor),
        );
        let result = engine.execute(&single_step_def(), Map::new()).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(result.status.is_terminal());
        assert!(result.completed_at.is_some());
        assert!(result.duration_ms.is_some());
        assert!(!engine.is_live(&result.run_id));
    }

    #[tokio::test]
    async fn failed_step_error_lands_on_the_run() {
        let mut executor = MockStepExecutor::new();
        executor
            .expect_execute_step()
            .returning(|_, _, _| Err(ErrorInfo::execution_failed("no backend")));

        let engine = WorkflowEngine::new(
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(executor),
        );
        let result = engine.execute(&single_step_def(), Map::new()).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.step_results["only"].attempts, 1);
        assert!(result.error.is_some());
    }

    #[test]
    fn cancel_on_unknown_run_is_a_noop() {
        let engine = WorkflowEngine::new(
            Arc::new(MemoryWorkflowStore::new()),
            Arc::new(MockStepExecutor::new()),
        );
        assert!(!engine.cancel("no-such-run"));
    }
}
