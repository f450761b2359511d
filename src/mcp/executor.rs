//! The tools/call execution pipeline.
//!
//! Resolve the tool, bind parameters, decrypt the datasource password,
//! execute against the engine and shape the result as MCP text content.
//! Every accepted call enqueues exactly one log record, success or error;
//! failures after tool resolution are reported inside the result with
//! `isError`, not as protocol errors.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::protocol::{McpError, ToolCallResult};
use super::McpRuntime;
use crate::dbconnector::{ConnectionConfig, QueryResult};
use crate::sqlbind;
use crate::store::models::{McpLog, McpLogStatus, McpServer, QueryParam, Tool};
use crate::store::{DatasourceStore, QueryStore, ToolStore};

/// Rows rendered before the output is truncated with a summary line.
const MAX_RENDERED_ROWS: usize = 100;

/// Resolves the server's tool id list, skipping ids that no longer load.
pub fn server_tools(runtime: &McpRuntime, server: &McpServer) -> Vec<Tool> {
    server
        .tool_ids
        .iter()
        .filter_map(|tool_id| match runtime.store.tool_by_id(tool_id) {
            Ok(Some(tool)) => Some(tool),
            Ok(None) => None,
            Err(err) => {
                debug!(server_id = %server.id, tool_id = %tool_id, "tool lookup failed: {err}");
                None
            }
        })
        .collect()
}

/// Runs one tool call against its datasource.
///
/// A name that matches no tool in the server is a protocol-level error;
/// everything after resolution lands in the result as `isError` content.
pub async fn execute_tool(
    runtime: &McpRuntime,
    server: &McpServer,
    tool_name: &str,
    arguments: &Map<String, Value>,
) -> Result<ToolCallResult, McpError> {
    let tool = match server_tools(runtime, server)
        .into_iter()
        .find(|tool| tool.name == tool_name)
    {
        Some(tool) => tool,
        None => {
            runtime.log_drain.enqueue(McpLog {
                id: Uuid::new_v4().to_string(),
                mcp_server_id: server.id.clone(),
                tool_id: String::new(),
                tool_name: tool_name.to_string(),
                parameters: arguments.clone(),
                response_time_ms: 0,
                status: McpLogStatus::Error,
                error_message: Some("tool not in server".to_string()),
                row_count: 0,
                timestamp: Utc::now(),
            });
            return Err(McpError::InvalidParams("tool not in server".to_string()));
        }
    };

    let started = Instant::now();
    let log = McpLog {
        id: Uuid::new_v4().to_string(),
        mcp_server_id: server.id.clone(),
        tool_id: tool.id.clone(),
        tool_name: tool.name.clone(),
        parameters: arguments.clone(),
        response_time_ms: 0,
        status: McpLogStatus::Success,
        error_message: None,
        row_count: 0,
        timestamp: Utc::now(),
    };

    let query = match runtime.store.query_by_id(&tool.query_id) {
        Ok(Some(query)) => query,
        Ok(None) => return Ok(fail(runtime, log, started, "Query not found".to_string())),
        Err(err) => {
            debug!(server_id = %server.id, tool_id = %tool.id, "query lookup failed: {err}");
            return Ok(fail(runtime, log, started, "Query not found".to_string()));
        }
    };

    let merged = match resolve_arguments(&query.parameters, arguments) {
        Ok(merged) => merged,
        Err(message) => return Ok(fail(runtime, log, started, message)),
    };

    let datasource = match runtime.store.datasource_by_id(&query.datasource_id) {
        Ok(Some(datasource)) => datasource,
        Ok(None) => {
            return Ok(fail(runtime, log, started, "DataSource not found".to_string()))
        }
        Err(err) => {
            debug!(server_id = %server.id, tool_id = %tool.id, "datasource lookup failed: {err}");
            return Ok(fail(runtime, log, started, "DataSource not found".to_string()));
        }
    };

    let password = match runtime.cipher.decrypt(&datasource.password) {
        Ok(password) => password,
        Err(_) => {
            return Ok(fail(
                runtime,
                log,
                started,
                "Failed to decrypt datasource password".to_string(),
            ))
        }
    };

    let binding = sqlbind::bind(&query.sql_template, &merged, datasource.kind.dialect());

    let config = ConnectionConfig {
        kind: datasource.kind,
        host: datasource.host.clone(),
        port: datasource.port,
        username: datasource.username.clone(),
        password,
        database: datasource.database.clone(),
        ssl_mode: Some(datasource.ssl_mode.clone()),
    };

    let connector = match runtime.connectors.connect(&config).await {
        Ok(connector) => connector,
        Err(err) => {
            return Ok(fail(
                runtime,
                log,
                started,
                format!("Failed to connect to datasource: {err}"),
            ))
        }
    };

    let timeout = Duration::from_secs(server.config.timeout_seconds.max(1));
    let executed = tokio::time::timeout(timeout, connector.execute(&binding.sql, &binding.values))
        .await;
    connector.close().await;

    let result = match executed {
        Err(_) => return Ok(fail(runtime, log, started, "timeout".to_string())),
        Ok(Err(err)) => {
            return Ok(fail(
                runtime,
                log,
                started,
                format!("Query execution failed: {err}"),
            ))
        }
        Ok(Ok(result)) => result,
    };

    let mut log = log;
    log.row_count = result.row_count as i64;
    log.response_time_ms = started.elapsed().as_millis() as i64;
    log.timestamp = Utc::now();
    runtime.log_drain.enqueue(log);

    Ok(ToolCallResult::text(format_query_result(&result)))
}

fn fail(runtime: &McpRuntime, mut log: McpLog, started: Instant, message: String) -> ToolCallResult {
    log.status = McpLogStatus::Error;
    log.error_message = Some(message.clone());
    log.response_time_ms = started.elapsed().as_millis() as i64;
    log.timestamp = Utc::now();
    runtime.log_drain.enqueue(log);
    ToolCallResult::error(message)
}

/// Applies declared defaults and enforces required parameters. Requiredness
/// is a property of the query's declared schema, not of the binder.
pub(crate) fn resolve_arguments(
    parameters: &[QueryParam],
    arguments: &Map<String, Value>,
) -> Result<Map<String, Value>, String> {
    let mut merged = arguments.clone();
    for param in parameters {
        if merged.contains_key(&param.name) {
            continue;
        }
        match &param.default {
            Some(default) => {
                merged.insert(param.name.clone(), default.clone());
            }
            None if param.required => {
                return Err(format!(
                    "Parameter validation failed: missing required parameter: {}",
                    param.name
                ));
            }
            None => {}
        }
    }
    Ok(merged)
}

/// Renders a result set in the stable text layout clients parse:
/// a row-count header, the column list, then up to [`MAX_RENDERED_ROWS`]
/// rows and a truncation line.
pub fn format_query_result(result: &QueryResult) -> String {
    if result.rows.is_empty() {
        return "No results found.".to_string();
    }

    let mut text = format!(
        "Found {} rows.\n\nColumns: [{}]\n\nData:\n",
        result.rows.len(),
        result.columns.join(" ")
    );
    for (index, row) in result.rows.iter().take(MAX_RENDERED_ROWS).enumerate() {
        let cells: Vec<String> = row.iter().map(render_cell).collect();
        text.push_str(&format!("{}: [{}]\n", index + 1, cells.join(" ")));
    }
    if result.rows.len() > MAX_RENDERED_ROWS {
        text.push_str(&format!(
            "... and {} more rows\n",
            result.rows.len() - MAX_RENDERED_ROWS
        ));
    }
    text
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}
