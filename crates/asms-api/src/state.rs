//! Shared application state handed to every handler.

use std::sync::Arc;

use asms_core::Gateway;
use asms_mcp::{McpHandler, SseSessionManager};
use asms_workflow::{WorkflowEngine, WorkflowStore};

use crate::router::RestRouter;

pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub engine: Arc<WorkflowEngine>,
    pub store: Arc<dyn WorkflowStore>,
    pub mcp: Arc<McpHandler>,
    pub sessions: Arc<SseSessionManager>,
    pub rest: Arc<RestRouter>,
}

impl AppState {
    pub fn new(
        gateway: Arc<Gateway>,
        engine: Arc<WorkflowEngine>,
        store: Arc<dyn WorkflowStore>,
        rest: RestRouter,
    ) -> Self {
        let mcp = Arc::new(McpHandler::new(gateway.clone()));
        Self {
            gateway,
            engine,
            store,
            mcp,
            sessions: Arc::new(SseSessionManager::new()),
            rest: Arc::new(rest),
        }
    }
}
