//! ASMS control-plane server.
//!
//! Wires the registry, gateway, workflow engine, and the three protocol
//! surfaces together: HTTP (with the MCP SSE session transport mounted),
//! the binary RPC listener, and optionally MCP over stdio
//! (`MCP_STDIO=true`, for use under an MCP-speaking supervisor).

mod builtin;

use std::env;
use std::sync::Arc;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use asms_api::{ApiConfig, AppState, RestRouter};
use asms_core::{Gateway, GatewayConfig, InMemoryRegistry, RequestType};
use asms_mcp::{McpHandler, StdioServer};
use asms_rpc::RpcServer;
use asms_workflow::{
    EngineDispatcher, GatewayStepExecutor, MemoryWorkflowStore, WorkflowEngine, WorkflowStore,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = ApiConfig::from_env();

    // Registry and base gateway. Workflow steps re-enter through the base
    // gateway so a workflow cannot recursively dispatch workflows.
    let registry = InMemoryRegistry::new();
    if let Err(e) = builtin::register(&registry) {
        return Err(std::io::Error::other(format!(
            "builtin unit registration failed: {}",
            e
        )));
    }
    let registry = Arc::new(registry);

    let gateway_config = GatewayConfig {
        default_timeout: config.gateway_timeout,
    };
    let base_gateway = Arc::new(
        Gateway::new(registry.clone()).with_config(gateway_config.clone()),
    );

    // Workflow engine over the in-memory store, executing steps through
    // the gateway.
    let store: Arc<dyn WorkflowStore> = Arc::new(MemoryWorkflowStore::new());
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        Arc::new(GatewayStepExecutor::new(base_gateway.clone())),
    ));

    // Outward-facing gateway with the workflow meta-unit wired in.
    let gateway = Arc::new(
        Gateway::new(registry.clone())
            .with_config(gateway_config)
            .with_workflow_dispatcher(Arc::new(EngineDispatcher::new(
                engine.clone(),
                store.clone(),
            ))),
    );

    let rest = RestRouter::new()
        .route("GET", "/api/v2/system/info", "system.info", RequestType::Query)
        .route(
            "POST",
            "/api/v2/system/ping",
            "system.ping",
            RequestType::Command,
        );

    let state = Arc::new(AppState::new(gateway.clone(), engine, store, rest));

    // Binary RPC listener.
    let rpc_addr = env::var("RPC_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());
    let rpc_listener = TcpListener::bind(&rpc_addr).await?;
    let rpc_server = Arc::new(RpcServer::new(gateway.clone()));
    tokio::spawn(async move {
        if let Err(e) = rpc_server.serve(rpc_listener).await {
            tracing::error!(error = %e, "rpc server exited");
        }
    });
    info!(addr = %rpc_addr, "binary rpc adapter listening");

    // Optional stdio MCP transport for supervisor-launched deployments.
    if env::var("MCP_STDIO").map(|v| v == "true" || v == "1").unwrap_or(false) {
        let stdio = StdioServer::new(Arc::new(McpHandler::new(gateway)));
        tokio::spawn(async move {
            if let Err(e) = stdio.run().await {
                tracing::error!(error = %e, "stdio transport exited");
            }
        });
        info!("mcp stdio transport active");
    }

    asms_api::run(state, config).await
}
