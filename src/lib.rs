//! # DataWeaver
//!
//! Packages parameterized SQL queries as MCP tools. A published server
//! exposes a JSON-RPC 2.0 endpoint (`initialize`, `ping`, `tools/list`,
//! `tools/call`) guarded by an API key and a per-server rate limit; tool
//! calls bind `:name` placeholders into the datasource's native dialect,
//! execute with the decrypted credentials and record a call log through a
//! bounded asynchronous drain.

pub mod analytics;
pub mod config;
pub mod crypto;
pub mod dbconnector;
pub mod manager;
pub mod mcp;
pub mod server;
pub mod sqlbind;
pub mod store;

pub use config::AppConfig;
pub use crypto::PasswordCipher;
pub use manager::McpServerManager;
pub use mcp::McpRuntime;
pub use store::SqliteMetaStore;
