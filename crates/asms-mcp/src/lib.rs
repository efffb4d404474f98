//! # ASMS MCP Adapter
//!
//! Exposes the unit registry as a Model Context Protocol server: every
//! command and query becomes a tool, registry resources are readable and
//! listable, and a small closed catalog of prompts is rendered on demand.
//! Two transports share one [`handler::McpHandler`]: newline-delimited
//! JSON over stdio, and SSE sessions mounted by the HTTP adapter.

pub mod handler;
pub mod prompts;
pub mod protocol;
pub mod tools;
pub mod transport;

pub use handler::McpHandler;
pub use protocol::{
    error_codes, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolResult, JSONRPC_VERSION,
    PROTOCOL_VERSION, SERVER_NAME,
};
pub use transport::{SessionError, SseSessionManager, StdioServer};
