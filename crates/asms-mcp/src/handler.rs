//! JSON-RPC method dispatch over the gateway.
//!
//! One handler instance serves every transport. Tool execution failures are
//! reported inside the tool result (`isError: true`), never as JSON-RPC
//! errors; only protocol-level failures use the JSON-RPC error channel.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use asms_core::{Gateway, Request, RequestContext, UnitRegistry};

use crate::prompts;
use crate::protocol::{
    GetPromptParams, GetPromptResult, InitializeResult, JsonRpcError, JsonRpcRequest,
    JsonRpcResponse, ListChangedCapability, ListPromptsResult, ListResourcesResult,
    ListToolsResult, PromptMessage, ReadResourceParams, ReadResourceResult, ResourceContents,
    ResourceDescriptor, ServerCapabilities, ServerInfo, ToolCallParams, ToolContent, ToolResult,
    JSONRPC_VERSION, PROTOCOL_VERSION, SERVER_NAME,
};
use crate::tools;

pub struct McpHandler {
    gateway: Arc<Gateway>,
    registry: Arc<dyn UnitRegistry>,
}

impl McpHandler {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let registry = gateway.registry().clone();
        Self { gateway, registry }
    }

    /// Dispatches one JSON-RPC request. Returns `None` for notifications.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone().unwrap_or(Value::Null);

        if request.jsonrpc != JSONRPC_VERSION {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!(
                    "unsupported jsonrpc version: {:?}",
                    request.jsonrpc
                )),
            ));
        }
        if request.method.is_empty() {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request("method must not be empty"),
            ));
        }

        debug!(method = %request.method, "mcp request");

        let is_notification = request.is_notification();

        let result = match request.method.as_str() {
            "initialize" => self.initialize(),
            "notifications/initialized" => return None,
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            "resources/list" => self.list_resources(),
            "resources/read" => self.read_resource(request.params).await,
            "prompts/list" => self.list_prompts(),
            "prompts/get" => self.get_prompt(request.params),
            "shutdown" => Ok(Value::Null),
            other => Err(JsonRpcError::method_not_found(other)),
        };

        if is_notification {
            return None;
        }

        Some(match result {
            Ok(value) => JsonRpcResponse::result(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        })
    }

    fn initialize(&self) -> Result<Value, JsonRpcError> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ListChangedCapability {
                    list_changed: Some(false),
                }),
                resources: Some(ListChangedCapability {
                    list_changed: Some(false),
                }),
                prompts: Some(ListChangedCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        encode(&result)
    }

    fn list_tools(&self) -> Result<Value, JsonRpcError> {
        encode(&ListToolsResult {
            tools: tools::list_tools(&self.registry),
        })
    }

    async fn call_tool(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: ToolCallParams = decode(params)?;

        let (unit, request_type) = tools::resolve_unit(&self.registry, &params.name)
            .ok_or_else(|| JsonRpcError::tool_not_found(&params.name))?;

        let request = Request::new(request_type, unit).with_input(params.arguments);
        let response = self.gateway.handle(request).await;

        let result = if response.success {
            let data = response.data.unwrap_or(Value::Null);
            let text = serde_json::to_string_pretty(&data)
                .unwrap_or_else(|_| data.to_string());
            ToolResult {
                content: vec![ToolContent::Text { text }],
                is_error: false,
            }
        } else {
            // Execution failures are tool results, never JSON-RPC errors.
            let text = match response.error {
                Some(error) => match &error.details {
                    Some(details) => format!("{} ({})", error.message, details),
                    None => error.message,
                },
                None => "unknown execution failure".to_string(),
            };
            ToolResult {
                content: vec![ToolContent::Text { text }],
                is_error: true,
            }
        };
        encode(&result)
    }

    fn list_resources(&self) -> Result<Value, JsonRpcError> {
        let resources = self
            .registry
            .list_resources()
            .into_iter()
            .map(|r| ResourceDescriptor {
                uri: r.uri().to_string(),
                name: r.name().to_string(),
                description: r.description().to_string(),
                mime_type: "application/json".to_string(),
            })
            .collect();
        encode(&ListResourcesResult { resources })
    }

    async fn read_resource(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: ReadResourceParams = decode(params)?;

        let resource = self
            .registry
            .get_resource_with_factory(&params.uri)
            .ok_or_else(|| JsonRpcError::resource_not_found(&params.uri))?;

        let ctx = RequestContext::new(None);
        let value = resource
            .get(&ctx)
            .await
            .map_err(|e| JsonRpcError::internal(e.into_error_info().to_string()))?;

        // String values pass through as-is; everything else marshals to JSON.
        let text = match value {
            Value::String(s) => s,
            other => serde_json::to_string(&other)
                .unwrap_or_else(|_| other.to_string()),
        };

        encode(&ReadResourceResult {
            contents: vec![ResourceContents {
                uri: params.uri,
                mime_type: "application/json".to_string(),
                text,
            }],
        })
    }

    fn list_prompts(&self) -> Result<Value, JsonRpcError> {
        encode(&ListPromptsResult {
            prompts: prompts::descriptors(),
        })
    }

    fn get_prompt(&self, params: Value) -> Result<Value, JsonRpcError> {
        let params: GetPromptParams = decode(params)?;

        let prompt = prompts::find(&params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown prompt: {}", params.name)))?;

        let text = prompts::render(prompt, &params.arguments)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

        encode(&GetPromptResult {
            description: prompt.description.to_string(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: ToolContent::Text { text },
            }],
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, JsonRpcError> {
    serde_json::from_value(params).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal(e.to_string()))
}
