//! Management operations on MCP servers: CRUD, the publish/unpublish
//! lifecycle, client config output, logs and statistics.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::analytics::{DayStats, Statistics, StatisticsBuilder, TimeRange, ToolStats};
use crate::store::models::{McpLog, McpServer, McpServerStatus, ServerConfig, Tool};
use crate::store::{McpServerStore, MetaStore, Page, StoreError, ToolStore};

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("mcp server not found")]
    NotFound,
    #[error("mcp server name already exists")]
    NameExists,
    #[error("at least one tool is required to publish")]
    NoToolsToPublish,
    #[error("tool {0} is not available")]
    ToolNotAvailable(String),
    #[error("tool {0} is not active")]
    ToolNotActive(String),
    #[error("server is not published")]
    NotPublished,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ManagerResult<T> = Result<T, ManagerError>;

#[derive(Debug, Deserialize)]
pub struct CreateMcpServerRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tool_ids: Vec<String>,
    #[serde(default)]
    pub config: Option<ServerConfig>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMcpServerRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tool_ids: Option<Vec<String>>,
    #[serde(default)]
    pub config: Option<ServerConfig>,
    #[serde(default)]
    pub status: Option<McpServerStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct McpServerResponse {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub tool_ids: Vec<String>,
    pub config: ServerConfig,
    pub status: McpServerStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
    pub updated_at: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolInfo>,
}

#[derive(Debug, Serialize)]
pub struct PublishMcpServerResponse {
    pub server: McpServerResponse,
    pub mcp_config: Value,
}

pub struct McpServerManager {
    store: Arc<dyn MetaStore>,
    base_url: String,
}

impl McpServerManager {
    pub fn new(store: Arc<dyn MetaStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    pub fn create(
        &self,
        user_id: i64,
        request: CreateMcpServerRequest,
    ) -> ManagerResult<McpServerResponse> {
        for tool_id in &request.tool_ids {
            if self.store.tool_by_id_for_user(tool_id, user_id)?.is_none() {
                return Err(ManagerError::ToolNotAvailable(tool_id.clone()));
            }
        }

        let now = Utc::now();
        let server = McpServer {
            id: Uuid::new_v4().to_string(),
            user_id,
            name: request.name,
            description: request.description,
            version: "1.0.0".to_string(),
            tool_ids: request.tool_ids,
            config: request.config.unwrap_or_default(),
            status: McpServerStatus::Draft,
            endpoint: String::new(),
            api_key: String::new(),
            created_at: now,
            updated_at: now,
        };

        match self.store.create_server(&server) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(ManagerError::NameExists),
            Err(err) => return Err(err.into()),
        }

        Ok(self.to_response(server, true)?)
    }

    pub fn list(
        &self,
        user_id: i64,
        page: &Page,
    ) -> ManagerResult<(Vec<McpServerResponse>, i64)> {
        let (servers, total) = self.store.list_servers(user_id, page)?;
        let responses = servers
            .into_iter()
            .map(|server| self.to_response(server, false))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((responses, total))
    }

    pub fn get(&self, id: &str, user_id: i64) -> ManagerResult<McpServerResponse> {
        let server = self
            .store
            .server_by_id_for_user(id, user_id)?
            .ok_or(ManagerError::NotFound)?;
        Ok(self.to_response(server, true)?)
    }

    /// Applies the provided fields and bumps the patch version.
    pub fn update(
        &self,
        id: &str,
        user_id: i64,
        request: UpdateMcpServerRequest,
    ) -> ManagerResult<McpServerResponse> {
        let mut server = self
            .store
            .server_by_id_for_user(id, user_id)?
            .ok_or(ManagerError::NotFound)?;

        if let Some(name) = request.name {
            server.name = name;
        }
        if let Some(description) = request.description {
            server.description = description;
        }
        if let Some(tool_ids) = request.tool_ids {
            for tool_id in &tool_ids {
                if self.store.tool_by_id_for_user(tool_id, user_id)?.is_none() {
                    return Err(ManagerError::ToolNotAvailable(tool_id.clone()));
                }
            }
            server.tool_ids = tool_ids;
        }
        if let Some(config) = request.config {
            server.config = config;
        }
        if let Some(status) = request.status {
            server.status = status;
        }

        server.version = increment_version(&server.version);

        match self.store.update_server(&server) {
            Ok(true) => {}
            Ok(false) => return Err(ManagerError::NotFound),
            Err(StoreError::Conflict(_)) => return Err(ManagerError::NameExists),
            Err(err) => return Err(err.into()),
        }

        Ok(self.to_response(server, true)?)
    }

    pub fn delete(&self, id: &str, user_id: i64) -> ManagerResult<()> {
        if self.store.delete_server(id, user_id)? {
            Ok(())
        } else {
            Err(ManagerError::NotFound)
        }
    }

    /// Publishes a server: every referenced tool must resolve and be
    /// active. Endpoint and API key are minted on first publish and kept
    /// on re-publish; the patch version bumps each time.
    pub fn publish(&self, id: &str, user_id: i64) -> ManagerResult<PublishMcpServerResponse> {
        let mut server = self
            .store
            .server_by_id_for_user(id, user_id)?
            .ok_or(ManagerError::NotFound)?;

        if server.tool_ids.is_empty() {
            return Err(ManagerError::NoToolsToPublish);
        }
        for tool_id in &server.tool_ids {
            let tool = self
                .store
                .tool_by_id_for_user(tool_id, user_id)?
                .ok_or_else(|| ManagerError::ToolNotAvailable(tool_id.clone()))?;
            if tool.status != crate::store::models::EntityStatus::Active {
                return Err(ManagerError::ToolNotActive(tool.name));
            }
        }

        if server.endpoint.is_empty() {
            server.endpoint = format!("{}/mcp/{}", self.base_url, server.id);
        }
        if server.api_key.is_empty() {
            server.api_key = generate_api_key();
        }
        server.status = McpServerStatus::Published;
        server.version = increment_version(&server.version);

        if !self.store.update_server(&server)? {
            return Err(ManagerError::NotFound);
        }

        let mcp_config = self.mcp_config_for(&server);
        let server = self.to_response(server, true)?;
        Ok(PublishMcpServerResponse { server, mcp_config })
    }

    /// Returns the server to draft. The stored API key is retained but no
    /// longer honored by runtime auth.
    pub fn unpublish(&self, id: &str, user_id: i64) -> ManagerResult<()> {
        let mut server = self
            .store
            .server_by_id_for_user(id, user_id)?
            .ok_or(ManagerError::NotFound)?;
        server.status = McpServerStatus::Draft;
        if self.store.update_server(&server)? {
            Ok(())
        } else {
            Err(ManagerError::NotFound)
        }
    }

    /// Claude-style client config for a published server.
    pub fn mcp_config(&self, id: &str, user_id: i64) -> ManagerResult<Value> {
        let server = self
            .store
            .server_by_id_for_user(id, user_id)?
            .ok_or(ManagerError::NotFound)?;
        if server.status != McpServerStatus::Published {
            return Err(ManagerError::NotPublished);
        }
        Ok(self.mcp_config_for(&server))
    }

    fn mcp_config_for(&self, server: &McpServer) -> Value {
        let endpoint = if server.endpoint.is_empty() {
            format!("{}/mcp/{}", self.base_url, server.id)
        } else {
            server.endpoint.clone()
        };
        json!({
            "mcpServers": {
                format!("dataweaver-{}", server.name): {
                    "command": "node",
                    "args": ["/path/to/mcp-client.js"],
                    "env": {
                        "DATAWEAVER_ENDPOINT": endpoint,
                        "DATAWEAVER_API_KEY": server.api_key,
                    },
                },
            },
        })
    }

    pub fn logs(
        &self,
        server_id: &str,
        user_id: i64,
        page: &Page,
    ) -> ManagerResult<(Vec<McpLog>, i64)> {
        if self
            .store
            .server_by_id_for_user(server_id, user_id)?
            .is_none()
        {
            return Err(ManagerError::NotFound);
        }
        Ok(self.store.logs_by_server(server_id, page)?)
    }

    pub fn statistics(
        &self,
        server_id: &str,
        user_id: i64,
        days: i64,
    ) -> ManagerResult<Statistics> {
        if self
            .store
            .server_by_id_for_user(server_id, user_id)?
            .is_none()
        {
            return Err(ManagerError::NotFound);
        }
        let days = if days <= 0 { 30 } else { days };

        let total = self.store.count_logs(server_id)?;
        let success = self
            .store
            .count_logs_by_status(server_id, crate::store::models::McpLogStatus::Success)?;
        let errors = self
            .store
            .count_logs_by_status(server_id, crate::store::models::McpLogStatus::Error)?;
        let avg_response = self.store.avg_response_ms(server_id)?;

        let top_tools = self
            .store
            .log_stats_by_tool(server_id)?
            .into_iter()
            .map(|s| ToolStats {
                tool_id: s.tool_id,
                tool_name: s.tool_name,
                call_count: s.call_count,
                success_count: s.success_count,
                error_count: s.error_count,
                success_rate: 0.0,
                avg_response_ms: s.avg_response_ms,
            })
            .collect();

        let calls_by_day = self
            .store
            .log_stats_by_day(server_id, days)?
            .into_iter()
            .map(|s| DayStats {
                date: s.date,
                call_count: s.call_count,
                success_count: s.success_count,
                error_count: s.error_count,
                success_rate: 0.0,
            })
            .collect();

        let end = Utc::now();
        let time_range = TimeRange {
            start: end - Duration::days(days),
            end,
        };

        Ok(StatisticsBuilder::new(server_id, time_range)
            .total_calls(total)
            .successful_calls(success)
            .failed_calls(errors)
            .avg_response_time(avg_response)
            .top_tools(top_tools)
            .calls_by_day(calls_by_day)
            .build())
    }

    fn to_response(
        &self,
        server: McpServer,
        include_tools: bool,
    ) -> Result<McpServerResponse, StoreError> {
        let tools = if include_tools {
            self.load_tools(&server.tool_ids)?
        } else {
            Vec::new()
        };

        let api_key = match server.status {
            McpServerStatus::Published if !server.api_key.is_empty() => Some(server.api_key),
            _ => None,
        };

        Ok(McpServerResponse {
            id: server.id,
            user_id: server.user_id,
            name: server.name,
            description: server.description,
            version: server.version,
            tool_ids: server.tool_ids,
            config: server.config,
            status: server.status,
            endpoint: server.endpoint,
            api_key,
            created_at: server.created_at,
            updated_at: server.updated_at,
            tools,
        })
    }

    fn load_tools(&self, tool_ids: &[String]) -> Result<Vec<ToolInfo>, StoreError> {
        let mut tools = Vec::with_capacity(tool_ids.len());
        for tool_id in tool_ids {
            if let Some(tool) = self.store.tool_by_id(tool_id)? {
                tools.push(tool_info(tool));
            }
        }
        Ok(tools)
    }
}

fn tool_info(tool: Tool) -> ToolInfo {
    ToolInfo {
        id: tool.id,
        name: tool.name,
        display_name: tool.display_name,
        description: tool.description,
    }
}

/// `sk_live_` + 64 hex chars from 32 random bytes.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("sk_live_{}", hex)
}

/// Bumps the patch component; malformed components count as zero.
pub fn increment_version(version: &str) -> String {
    let mut parts = [0u64; 3];
    for (index, part) in version.splitn(3, '.').enumerate() {
        parts[index] = part.parse().unwrap_or(0);
    }
    format!("{}.{}.{}", parts[0], parts[1], parts[2] + 1)
}
