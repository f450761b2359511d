//! Shared state handed to every axum handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::manager::McpServerManager;
use crate::mcp::McpRuntime;
use crate::store::MetaStore;

#[derive(Clone)]
pub struct ServerState {
    pub runtime: Arc<McpRuntime>,
    pub manager: Arc<McpServerManager>,
    pub store: Arc<dyn MetaStore>,
    pub jwt_secret: Arc<String>,
}

impl FromRef<ServerState> for Arc<McpRuntime> {
    fn from_ref(input: &ServerState) -> Self {
        input.runtime.clone()
    }
}

impl FromRef<ServerState> for Arc<McpServerManager> {
    fn from_ref(input: &ServerState) -> Self {
        input.manager.clone()
    }
}
