//! Asynchronous persistence path for call logs.
//!
//! Handlers enqueue without blocking; one background consumer writes the
//! records through the store. When the channel is full the producer writes
//! synchronously on its own context instead, so an accepted call always
//! yields exactly one persisted log and none are dropped silently. Store
//! failures are logged and never surfaced to the caller.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::store::models::McpLog;
use crate::store::{McpServerStore, MetaStore};

/// Default channel depth.
pub const DEFAULT_DEPTH: usize = 1024;

pub struct LogDrain {
    store: Arc<dyn MetaStore>,
    sender: Mutex<Option<mpsc::Sender<McpLog>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl LogDrain {
    /// Starts the drain with its background consumer.
    pub fn start(store: Arc<dyn MetaStore>, depth: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<McpLog>(depth.max(1));

        let consumer_store = store.clone();
        let consumer = tokio::spawn(async move {
            while let Some(log) = receiver.recv().await {
                if let Err(err) = consumer_store.create_log(&log) {
                    error!(
                        server_id = %log.mcp_server_id,
                        tool_id = %log.tool_id,
                        "failed to persist call log: {err}"
                    );
                }
            }
        });

        Self {
            store,
            sender: Mutex::new(Some(sender)),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Creates a drain with no consumer; every enqueue beyond the channel
    /// depth takes the synchronous overflow path.
    #[cfg(test)]
    fn start_detached(store: Arc<dyn MetaStore>, depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<McpLog>(depth.max(1));
        std::mem::forget(receiver);
        Self {
            store,
            sender: Mutex::new(Some(sender)),
            consumer: Mutex::new(None),
        }
    }

    /// Hands a log to the drain. Fast path is a non-blocking channel send;
    /// a full or closed channel falls back to a synchronous write.
    pub fn enqueue(&self, log: McpLog) {
        let sender = self.sender.lock().unwrap().clone();
        let rejected = match sender {
            Some(sender) => match sender.try_send(log) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(log))
                | Err(mpsc::error::TrySendError::Closed(log)) => log,
            },
            None => log,
        };

        if let Err(err) = self.store.create_log(&rejected) {
            error!(
                server_id = %rejected.mcp_server_id,
                tool_id = %rejected.tool_id,
                "failed to persist call log on overflow path: {err}"
            );
        }
    }

    /// Closes the channel and waits for the consumer to finish writing
    /// whatever is still queued.
    pub async fn shutdown(&self) {
        self.sender.lock().unwrap().take();
        let consumer = self.consumer.lock().unwrap().take();
        if let Some(consumer) = consumer {
            if let Err(err) = consumer.await {
                warn!("log drain consumer ended abnormally: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{McpLogStatus, McpServerStatus, ServerConfig};
    use crate::store::{McpServerStore, SqliteMetaStore, UserStore};
    use chrono::Utc;
    use serde_json::Map;

    fn setup() -> (Arc<SqliteMetaStore>, String) {
        let store = Arc::new(SqliteMetaStore::open_in_memory().unwrap());
        let user = store.create_user("alice", "a@example.com", "h").unwrap();
        let server = crate::store::models::McpServer {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id,
            name: "srv".into(),
            description: String::new(),
            version: "1.0.0".into(),
            tool_ids: vec![],
            config: ServerConfig::default(),
            status: McpServerStatus::Draft,
            endpoint: String::new(),
            api_key: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.create_server(&server).unwrap();
        (store, server.id)
    }

    fn log(server_id: &str) -> McpLog {
        McpLog {
            id: uuid::Uuid::new_v4().to_string(),
            mcp_server_id: server_id.to_string(),
            tool_id: "t1".into(),
            tool_name: "tool".into(),
            parameters: Map::new(),
            response_time_ms: 1,
            status: McpLogStatus::Success,
            error_message: None,
            row_count: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn drains_enqueued_logs_before_shutdown() {
        let (store, server_id) = setup();
        let drain = LogDrain::start(store.clone(), 16);

        for _ in 0..10 {
            drain.enqueue(log(&server_id));
        }
        drain.shutdown().await;

        assert_eq!(store.count_logs(&server_id).unwrap(), 10);
    }

    #[tokio::test]
    async fn overflow_writes_synchronously() {
        let (store, server_id) = setup();
        let drain = LogDrain::start_detached(store.clone(), 2);

        // Two fill the channel; the remaining three must hit the store
        // directly instead of being dropped.
        for _ in 0..5 {
            drain.enqueue(log(&server_id));
        }

        assert_eq!(store.count_logs(&server_id).unwrap(), 3);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_still_persists() {
        let (store, server_id) = setup();
        let drain = LogDrain::start(store.clone(), 4);
        drain.shutdown().await;

        drain.enqueue(log(&server_id));
        assert_eq!(store.count_logs(&server_id).unwrap(), 1);
    }
}
