//! The MCP runtime: authentication, dispatch, tool execution, logging.

pub mod executor;
pub mod log_drain;
pub mod protocol;
pub mod rate_limit;
pub mod runtime;

use std::sync::Arc;

use crate::crypto::PasswordCipher;
use crate::dbconnector::ConnectorFactory;
use crate::store::MetaStore;
use log_drain::{LogDrain, DEFAULT_DEPTH};
use rate_limit::RateLimiterRegistry;

/// Shared state of the runtime: the cipher, the per-server rate limiters,
/// the log drain and the connector factory. Built once at startup and torn
/// down explicitly; nothing here is ambient module state.
pub struct McpRuntime {
    pub store: Arc<dyn MetaStore>,
    pub cipher: PasswordCipher,
    pub connectors: Arc<dyn ConnectorFactory>,
    pub rate_limiters: RateLimiterRegistry,
    pub log_drain: LogDrain,
}

impl McpRuntime {
    pub fn new(
        store: Arc<dyn MetaStore>,
        cipher: PasswordCipher,
        connectors: Arc<dyn ConnectorFactory>,
    ) -> Self {
        let log_drain = LogDrain::start(store.clone(), DEFAULT_DEPTH);
        Self {
            store,
            cipher,
            connectors,
            rate_limiters: RateLimiterRegistry::default(),
            log_drain,
        }
    }

    /// Flushes and stops the log drain. Called once on server shutdown.
    pub async fn shutdown(&self) {
        self.log_drain.shutdown().await;
    }
}
