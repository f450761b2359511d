//! Persistent entities.
//!
//! Statuses are closed enums; unknown strings are rejected when rows are
//! loaded rather than carried around as free text.

use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::dbconnector::DataSourceKind;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Active,
    Inactive,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
        }
    }
}

impl FromStr for EntityStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntityStatus::Active),
            "inactive" => Ok(EntityStatus::Inactive),
            other => bail!("unknown status: {other}"),
        }
    }
}

/// A registered database connection. The password field holds ciphertext;
/// plaintext only exists transiently inside a tool call or connection test.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub kind: DataSourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Declared type of a query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Int,
    Float,
    Bool,
    Date,
}

impl ParamKind {
    /// JSON Schema type used for generated tool input schemas.
    pub fn json_schema_type(&self) -> &'static str {
        match self {
            ParamKind::String | ParamKind::Date => "string",
            ParamKind::Int => "integer",
            ParamKind::Float => "number",
            ParamKind::Bool => "boolean",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A parameterized SQL template against one datasource.
#[derive(Debug, Clone)]
pub struct Query {
    pub id: String,
    pub user_id: i64,
    pub datasource_id: String,
    pub name: String,
    pub description: String,
    pub sql_template: String,
    pub parameters: Vec<QueryParam>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named handle onto one query, exposed to MCP clients.
#[derive(Debug, Clone)]
pub struct Tool {
    pub id: String,
    pub user_id: i64,
    pub query_id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub input_schema: Option<Value>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tool {
    /// The MCP `inputSchema` for this tool: the stored schema when one was
    /// provided, otherwise generated from the query's declared parameters.
    pub fn mcp_input_schema(&self, parameters: &[QueryParam]) -> Value {
        if let Some(schema) = &self.input_schema {
            return schema.clone();
        }
        generated_input_schema(parameters)
    }
}

/// Builds a JSON Schema object from declared query parameters.
pub fn generated_input_schema(parameters: &[QueryParam]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in parameters {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(param.kind.json_schema_type()));
        if let Some(description) = &param.description {
            prop.insert("description".into(), json!(description));
        }
        if let Some(default) = &param.default {
            prop.insert("default".into(), default.clone());
        }
        properties.insert(param.name.clone(), Value::Object(prop));
        if param.required {
            required.push(json!(param.name));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerStatus {
    Draft,
    Published,
    Archived,
}

impl McpServerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpServerStatus::Draft => "draft",
            McpServerStatus::Published => "published",
            McpServerStatus::Archived => "archived",
        }
    }
}

impl FromStr for McpServerStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(McpServerStatus::Draft),
            "published" => Ok(McpServerStatus::Published),
            "archived" => Ok(McpServerStatus::Archived),
            other => bail!("unknown server status: {other}"),
        }
    }
}

/// Per-server runtime knobs, stored as a JSON column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_rate_limit_per_min")]
    pub rate_limit_per_min: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_caching: bool,
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_rate_limit_per_min() -> i64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            rate_limit_per_min: default_rate_limit_per_min(),
            log_level: default_log_level(),
            enable_caching: false,
        }
    }
}

/// A publishable collection of tools with its own endpoint and API key.
#[derive(Debug, Clone)]
pub struct McpServer {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub tool_ids: Vec<String>,
    pub config: ServerConfig,
    pub status: McpServerStatus,
    pub endpoint: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpLogStatus {
    Success,
    Error,
}

impl McpLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpLogStatus::Success => "success",
            McpLogStatus::Error => "error",
        }
    }
}

impl FromStr for McpLogStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(McpLogStatus::Success),
            "error" => Ok(McpLogStatus::Error),
            other => bail!("unknown log status: {other}"),
        }
    }
}

/// One tool invocation, success or error. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct McpLog {
    pub id: String,
    pub mcp_server_id: String,
    pub tool_id: String,
    pub tool_name: String,
    pub parameters: Map<String, Value>,
    pub response_time_ms: i64,
    pub status: McpLogStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub row_count: i64,
    pub timestamp: DateTime<Utc>,
}
