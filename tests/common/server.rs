//! Test server lifecycle management.
//!
//! Each test spawns an isolated server on a random port with its own
//! temporary metadata database and a stub connector factory standing in
//! for real database engines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;

use dataweaver::dbconnector::stub::StubConnectorFactory;
use dataweaver::server::make_app;
use dataweaver::server::state::ServerState;
use dataweaver::store::McpServerStore;
use dataweaver::{McpRuntime, McpServerManager, PasswordCipher, SqliteMetaStore};

use super::constants::*;

pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345").
    pub base_url: String,

    /// Metadata store shared with the running app, for direct assertions.
    pub store: Arc<SqliteMetaStore>,

    /// The stub engine behind every datasource in this server.
    pub factory: Arc<StubConnectorFactory>,

    pub runtime: Arc<McpRuntime>,

    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("meta.db");
        let store = Arc::new(SqliteMetaStore::new(&db_path).expect("Failed to open store"));

        let cipher = PasswordCipher::new(&TEST_ENCRYPTION_KEY).expect("Failed to build cipher");
        let factory = Arc::new(StubConnectorFactory::empty());
        let runtime = Arc::new(McpRuntime::new(store.clone(), cipher, factory.clone()));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let manager = Arc::new(McpServerManager::new(store.clone(), base_url.clone()));

        let state = ServerState {
            runtime: runtime.clone(),
            manager,
            store: store.clone(),
            jwt_secret: Arc::new(TEST_JWT_SECRET.to_string()),
        };

        let app = make_app(state);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("Server failed");
        });

        let server = Self {
            base_url,
            store,
            factory,
            runtime,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
        };

        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!("Server did not become ready within {}ms", SERVER_READY_TIMEOUT_MS);
            }
            match client.get(format!("{}/health", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Polls until the server's log count reaches `expected` (the drain is
    /// asynchronous, so rows appear shortly after the response).
    pub async fn wait_for_logs(&self, server_id: &str, expected: i64) {
        let start = std::time::Instant::now();
        loop {
            let count = self.store.count_logs(server_id).expect("count_logs failed");
            if count >= expected {
                assert_eq!(count, expected, "more logs than expected");
                return;
            }
            if start.elapsed() > Duration::from_millis(LOG_WAIT_TIMEOUT_MS) {
                panic!("expected {expected} logs, found {count}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
