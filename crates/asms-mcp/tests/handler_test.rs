//! Handler round-trips: tools/list + tools/call, resources, prompts, and
//! protocol-level error codes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use asms_core::{
    Command, FieldSchema, FieldType, Gateway, InMemoryRegistry, Query, RequestContext, Resource,
    UnitError, UnitSchema,
};
use asms_mcp::protocol::error_codes;
use asms_mcp::{JsonRpcRequest, McpHandler};

struct ListModels;

#[async_trait]
impl Query for ListModels {
    fn name(&self) -> &str {
        "model.list"
    }

    fn description(&self) -> &str {
        "List registered model deployments"
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        _input: &Map<String, Value>,
    ) -> Result<Value, UnitError> {
        Ok(json!({"models": [{"id": "m1"}, {"id": "m2"}]}))
    }
}

struct LoadModel;

#[async_trait]
impl Command for LoadModel {
    fn name(&self) -> &str {
        "model.load"
    }

    fn description(&self) -> &str {
        "Load a model onto an engine"
    }

    fn input_schema(&self) -> UnitSchema {
        UnitSchema::new()
            .field(FieldSchema::new("model", FieldType::String, "Model id").required())
            .field(
                FieldSchema::new("replicas", FieldType::Integer, "Replica count")
                    .with_minimum(1.0),
            )
    }

    async fn execute(
        &self,
        _ctx: &RequestContext,
        input: &Map<String, Value>,
    ) -> Result<Value, UnitError> {
        match input.get("model") {
            Some(model) => Ok(json!({"loaded": model})),
            None => Err(UnitError::Coded(asms_core::ErrorInfo::validation_failed(
                "model is required",
            ))),
        }
    }
}

struct StatusResource;

#[async_trait]
impl Resource for StatusResource {
    fn uri(&self) -> &str {
        "asms://system/status"
    }

    fn name(&self) -> &str {
        "system-status"
    }

    fn description(&self) -> &str {
        "Aggregate control-plane status"
    }

    async fn get(&self, _ctx: &RequestContext) -> Result<Value, UnitError> {
        Ok(json!({"healthy": true}))
    }
}

fn handler() -> McpHandler {
    let registry = InMemoryRegistry::new();
    registry.register_query(Arc::new(ListModels)).unwrap();
    registry.register_command(Arc::new(LoadModel)).unwrap();
    registry.register_resource(Arc::new(StatusResource)).unwrap();
    McpHandler::new(Arc::new(Gateway::new(Arc::new(registry))))
}

fn request(id: i64, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest::new(json!(id), method, params)
}

async fn call(handler: &McpHandler, id: i64, method: &str, params: Value) -> Value {
    let response = handler
        .handle(request(id, method, params))
        .await
        .expect("expected a response");
    serde_json::to_value(&response).unwrap()
}

#[tokio::test]
async fn initialize_identifies_the_server() {
    let handler = handler();
    let response = call(&handler, 1, "initialize", Value::Null).await;
    let result = &response["result"];
    assert_eq!(result["protocolVersion"], "2024-11-05");
    assert_eq!(result["serverInfo"]["name"], "asms-control-plane");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_then_call_round_trip() {
    let handler = handler();

    let listing = call(&handler, 1, "tools/list", Value::Null).await;
    let tools = listing["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    assert!(names.contains(&"model_list"));
    assert!(names.contains(&"model_load"));

    let load = tools.iter().find(|t| t["name"] == "model_load").unwrap();
    assert_eq!(load["inputSchema"]["type"], "object");
    assert_eq!(load["inputSchema"]["required"], json!(["model"]));
    assert_eq!(load["inputSchema"]["properties"]["replicas"]["minimum"], 1.0);

    let called = call(
        &handler,
        2,
        "tools/call",
        json!({"name": "model_list", "arguments": {}}),
    )
    .await;
    let result = &called["result"];
    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().unwrap();
    let parsed: Value = serde_json::from_str(text).expect("tool text is valid JSON");
    assert_eq!(parsed["models"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn execution_failure_is_a_tool_result_not_a_protocol_error() {
    let handler = handler();
    let called = call(
        &handler,
        3,
        "tools/call",
        json!({"name": "model_load", "arguments": {}}),
    )
    .await;
    assert!(called.get("error").is_none());
    let result = &called["result"];
    assert_eq!(result["isError"], true);
    assert!(result["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("model is required"));
}

#[tokio::test]
async fn unknown_tool_is_a_protocol_error() {
    let handler = handler();
    let called = call(
        &handler,
        4,
        "tools/call",
        json!({"name": "absent_tool", "arguments": {}}),
    )
    .await;
    assert_eq!(called["error"]["code"], error_codes::TOOL_NOT_FOUND);
}

#[tokio::test]
async fn malformed_params_are_invalid_params() {
    let handler = handler();
    let called = call(&handler, 5, "tools/call", json!({"no_name": true})).await;
    assert_eq!(called["error"]["code"], error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
    let handler = handler();
    let called = call(&handler, 6, "tools/destroy", Value::Null).await;
    assert_eq!(called["error"]["code"], error_codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn wrong_version_and_empty_method_are_invalid_requests() {
    let handler = handler();

    let mut bad_version = request(7, "ping", Value::Null);
    bad_version.jsonrpc = "1.0".into();
    let response = handler.handle(bad_version).await.unwrap();
    assert_eq!(response.error.unwrap().code, error_codes::INVALID_REQUEST);

    let empty_method = request(8, "", Value::Null);
    let response = handler.handle(empty_method).await.unwrap();
    assert_eq!(response.error.unwrap().code, error_codes::INVALID_REQUEST);
}

#[tokio::test]
async fn initialized_notification_has_no_response() {
    let handler = handler();
    let mut notification = request(0, "notifications/initialized", Value::Null);
    notification.id = None;
    assert!(handler.handle(notification).await.is_none());
}

#[tokio::test]
async fn resources_list_and_read() {
    let handler = handler();

    let listing = call(&handler, 9, "resources/list", Value::Null).await;
    let resources = listing["result"]["resources"].as_array().unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["uri"], "asms://system/status");
    assert_eq!(resources[0]["mimeType"], "application/json");

    let read = call(
        &handler,
        10,
        "resources/read",
        json!({"uri": "asms://system/status"}),
    )
    .await;
    let contents = &read["result"]["contents"][0];
    let value: Value = serde_json::from_str(contents["text"].as_str().unwrap()).unwrap();
    assert_eq!(value["healthy"], true);

    let missing = call(&handler, 11, "resources/read", json!({"uri": "asms://nope"})).await;
    assert_eq!(missing["error"]["code"], error_codes::RESOURCE_NOT_FOUND);
}

#[tokio::test]
async fn prompts_list_and_get() {
    let handler = handler();

    let listing = call(&handler, 12, "prompts/list", Value::Null).await;
    let prompts = listing["result"]["prompts"].as_array().unwrap();
    assert!(!prompts.is_empty());

    let rendered = call(
        &handler,
        13,
        "prompts/get",
        json!({"name": "design_workflow", "arguments": {"task": "batch embed documents"}}),
    )
    .await;
    let text = rendered["result"]["messages"][0]["content"]["text"]
        .as_str()
        .unwrap();
    assert!(text.contains("batch embed documents"));

    let missing_arg = call(
        &handler,
        14,
        "prompts/get",
        json!({"name": "design_workflow", "arguments": {}}),
    )
    .await;
    assert_eq!(missing_arg["error"]["code"], error_codes::INVALID_PARAMS);
}

#[tokio::test]
async fn ping_and_shutdown_respond() {
    let handler = handler();
    let ping = call(&handler, 15, "ping", Value::Null).await;
    assert!(ping["result"].is_object());

    let shutdown = call(&handler, 16, "shutdown", Value::Null).await;
    assert!(shutdown.get("error").is_none());
}
