//! Durable storage for users, datasources, queries, tools, servers and logs.
//!
//! One trait per entity keeps the seams narrow; [`MetaStore`] bundles them
//! for consumers that need the whole surface. All lookups are scoped: the
//! `_for_user` variants enforce ownership, the unscoped ones exist for the
//! runtime which authenticates by API key instead.

pub mod models;
mod schema;
mod sqlite_store;

pub use sqlite_store::SqliteMetaStore;

use thiserror::Error;

use models::{DataSource, McpLog, McpLogStatus, McpServer, Query, Tool, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    Conflict(&'static str),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 1-based pagination with the size clamped to 1..=100.
#[derive(Debug, Clone)]
pub struct Page {
    pub page: i64,
    pub size: i64,
    pub keyword: Option<String>,
}

impl Page {
    pub fn new(page: i64, size: i64, keyword: Option<String>) -> Self {
        let page = page.max(1);
        let size = if (1..=100).contains(&size) { size } else { 20 };
        let keyword = keyword.filter(|k| !k.is_empty());
        Self {
            page,
            size,
            keyword,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }
}

/// Aggregated per-tool call counts, ordered by call count descending.
#[derive(Debug, Clone)]
pub struct ToolLogStats {
    pub tool_id: String,
    pub tool_name: String,
    pub call_count: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_response_ms: f64,
}

/// Aggregated per-day call counts, ordered by date descending.
#[derive(Debug, Clone)]
pub struct DayLogStats {
    pub date: String,
    pub call_count: i64,
    pub success_count: i64,
    pub error_count: i64,
}

pub trait UserStore {
    fn create_user(&self, username: &str, email: &str, password_hash: &str) -> StoreResult<User>;
    fn user_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    fn user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
}

pub trait DatasourceStore {
    fn create_datasource(&self, datasource: &DataSource) -> StoreResult<()>;
    fn datasource_by_id(&self, id: &str) -> StoreResult<Option<DataSource>>;
    fn datasource_by_id_for_user(&self, id: &str, user_id: i64)
        -> StoreResult<Option<DataSource>>;
    fn list_datasources(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<DataSource>, i64)>;
    fn update_datasource(&self, datasource: &DataSource) -> StoreResult<bool>;
    fn delete_datasource(&self, id: &str, user_id: i64) -> StoreResult<bool>;
}

pub trait QueryStore {
    fn create_query(&self, query: &Query) -> StoreResult<()>;
    fn query_by_id(&self, id: &str) -> StoreResult<Option<Query>>;
    fn query_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<Query>>;
    fn list_queries(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<Query>, i64)>;
    fn update_query(&self, query: &Query) -> StoreResult<bool>;
    fn delete_query(&self, id: &str, user_id: i64) -> StoreResult<bool>;
}

pub trait ToolStore {
    fn create_tool(&self, tool: &Tool) -> StoreResult<()>;
    fn tool_by_id(&self, id: &str) -> StoreResult<Option<Tool>>;
    fn tool_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<Tool>>;
    fn list_tools(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<Tool>, i64)>;
    fn update_tool(&self, tool: &Tool) -> StoreResult<bool>;
    fn delete_tool(&self, id: &str, user_id: i64) -> StoreResult<bool>;
}

pub trait McpServerStore {
    fn create_server(&self, server: &McpServer) -> StoreResult<()>;
    fn server_by_id(&self, id: &str) -> StoreResult<Option<McpServer>>;
    fn server_by_id_for_user(&self, id: &str, user_id: i64) -> StoreResult<Option<McpServer>>;
    /// Resolves an API key to its server. Only published servers match;
    /// a retained key on a draft or archived server is not honored.
    fn server_by_api_key(&self, api_key: &str) -> StoreResult<Option<McpServer>>;
    fn list_servers(&self, user_id: i64, page: &Page) -> StoreResult<(Vec<McpServer>, i64)>;
    fn update_server(&self, server: &McpServer) -> StoreResult<bool>;
    fn delete_server(&self, id: &str, user_id: i64) -> StoreResult<bool>;

    fn create_log(&self, log: &McpLog) -> StoreResult<()>;
    fn logs_by_server(&self, server_id: &str, page: &Page) -> StoreResult<(Vec<McpLog>, i64)>;
    fn count_logs(&self, server_id: &str) -> StoreResult<i64>;
    fn count_logs_by_status(&self, server_id: &str, status: McpLogStatus) -> StoreResult<i64>;
    fn avg_response_ms(&self, server_id: &str) -> StoreResult<f64>;
    fn log_stats_by_tool(&self, server_id: &str) -> StoreResult<Vec<ToolLogStats>>;
    fn log_stats_by_day(&self, server_id: &str, days: i64) -> StoreResult<Vec<DayLogStats>>;
}

pub trait MetaStore:
    UserStore + DatasourceStore + QueryStore + ToolStore + McpServerStore + Send + Sync
{
}

impl<T> MetaStore for T where
    T: UserStore + DatasourceStore + QueryStore + ToolStore + McpServerStore + Send + Sync
{
}
