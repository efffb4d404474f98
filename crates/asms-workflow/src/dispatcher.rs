//! Glue between the engine and the gateway, in both directions.
//!
//! [`EngineDispatcher`] lets the gateway treat workflows as a meta-unit:
//! `type=workflow` requests load the definition from the store and execute
//! it. [`GatewayStepExecutor`] closes the loop the other way: each workflow
//! step re-enters the gateway as a command or query, chosen by registry
//! membership.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use asms_core::{
    ErrorInfo, Gateway, Request, RequestContext, RequestType, UnitError, WorkflowDispatcher,
};

use crate::engine::{StepExecutor, WorkflowEngine};
use crate::store::WorkflowStore;

pub struct EngineDispatcher {
    engine: Arc<WorkflowEngine>,
    store: Arc<dyn WorkflowStore>,
}

impl EngineDispatcher {
    pub fn new(engine: Arc<WorkflowEngine>, store: Arc<dyn WorkflowStore>) -> Self {
        Self { engine, store }
    }
}

#[async_trait]
impl WorkflowDispatcher for EngineDispatcher {
    async fn dispatch(
        &self,
        _ctx: &RequestContext,
        workflow: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError> {
        let def = self
            .store
            .get_definition(workflow)
            .await
            .map_err(|e| UnitError::Coded(e.into()))?;
        let result = self
            .engine
            .execute(&def, input.clone())
            .await
            .map_err(UnitError::Coded)?;
        serde_json::to_value(&result).map_err(UnitError::from)
    }
}

pub struct GatewayStepExecutor {
    gateway: Arc<Gateway>,
}

impl GatewayStepExecutor {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl StepExecutor for GatewayStepExecutor {
    async fn execute_step(
        &self,
        ctx: &RequestContext,
        step_type: &str,
        input: &Map<String, Value>,
    ) -> Result<Value, ErrorInfo> {
        let registry = self.gateway.registry();
        let request_type = if registry.has_command(step_type) {
            RequestType::Command
        } else if registry.has_query(step_type) {
            RequestType::Query
        } else {
            return Err(ErrorInfo::unit_not_found(step_type));
        };

        let request = Request::new(request_type, step_type).with_input(input.clone());
        let response = self.gateway.handle_with_context(&ctx.child(), request).await;

        if response.success {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(response
                .error
                .unwrap_or_else(|| ErrorInfo::internal("gateway returned failure without error")))
        }
    }
}
