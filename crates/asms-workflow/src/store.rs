//! Persistence contract for workflow definitions and execution records.
//!
//! The engine assumes nothing beyond this trait; the in-memory
//! implementation backs tests and single-node deployments, and durable
//! backends plug in behind the same contract.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use asms_core::{codes, ErrorInfo};

use crate::definition::WorkflowDefinition;
use crate::engine::ExecutionResult;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("workflow definition not found: {name}")]
    DefinitionNotFound { name: String },

    #[error("execution not found: {run_id}")]
    ExecutionNotFound { run_id: String },

    #[error("store backend error: {message}")]
    Backend { message: String },
}

impl From<StoreError> for ErrorInfo {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::DefinitionNotFound { .. } | StoreError::ExecutionNotFound { .. } => {
                ErrorInfo::new(codes::NOT_FOUND, err.to_string())
            }
            StoreError::Backend { .. } => ErrorInfo::internal(err.to_string()),
        }
    }
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), StoreError>;
    async fn get_definition(&self, name: &str) -> Result<WorkflowDefinition, StoreError>;
    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError>;
    async fn delete_definition(&self, name: &str) -> Result<(), StoreError>;

    async fn save_execution(&self, result: &ExecutionResult) -> Result<(), StoreError>;
    async fn get_execution(&self, run_id: &str) -> Result<ExecutionResult, StoreError>;
    async fn list_executions(
        &self,
        workflow: Option<&str>,
    ) -> Result<Vec<ExecutionResult>, StoreError>;
}

/// Reference implementation: two lock-guarded maps.
#[derive(Default)]
pub struct MemoryWorkflowStore {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
    executions: RwLock<HashMap<String, ExecutionResult>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), StoreError> {
        self.definitions
            .write()
            .await
            .insert(def.name.clone(), def.clone());
        Ok(())
    }

    async fn get_definition(&self, name: &str) -> Result<WorkflowDefinition, StoreError> {
        self.definitions
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::DefinitionNotFound {
                name: name.to_string(),
            })
    }

    async fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>, StoreError> {
        let mut definitions: Vec<_> = self.definitions.read().await.values().cloned().collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    async fn delete_definition(&self, name: &str) -> Result<(), StoreError> {
        self.definitions
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::DefinitionNotFound {
                name: name.to_string(),
            })
    }

    async fn save_execution(&self, result: &ExecutionResult) -> Result<(), StoreError> {
        self.executions
            .write()
            .await
            .insert(result.run_id.clone(), result.clone());
        Ok(())
    }

    async fn get_execution(&self, run_id: &str) -> Result<ExecutionResult, StoreError> {
        self.executions
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| StoreError::ExecutionNotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn list_executions(
        &self,
        workflow: Option<&str>,
    ) -> Result<Vec<ExecutionResult>, StoreError> {
        let executions = self.executions.read().await;
        let mut results: Vec<_> = executions
            .values()
            .filter(|e| workflow.map_or(true, |w| e.workflow_id == w))
            .cloned()
            .collect();
        results.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(results)
    }
}
