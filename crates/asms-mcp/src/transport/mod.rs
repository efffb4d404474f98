//! MCP transports: stdio (newline-delimited JSON) and the SSE session
//! layer consumed by the HTTP adapter.

pub mod sse;
pub mod stdio;

pub use sse::{SessionError, SseSessionManager, SESSION_BUFFER_SIZE};
pub use stdio::StdioServer;
