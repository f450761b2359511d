//! HTTP surface of the MCP runtime.
//!
//! `POST /mcp/{serverId}` carries single JSON-RPC 2.0 objects, the SSE
//! endpoint streams `connected` + heartbeats, and the health endpoint is
//! unauthenticated. Every JSON-RPC error goes out with HTTP 200 except a
//! rate-limit rejection, which is HTTP 429.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::executor;
use super::protocol::{
    methods, McpError, McpRequest, McpResponse, RequestId, ToolCallResult, ToolDefinition,
    ToolsCallParams, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use crate::server::state::ServerState;
use crate::store::models::McpServer;
use crate::store::{McpServerStore, QueryStore};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Bearer-secret comparison that does not short-circuit on content.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Auth precedence for the JSON-RPC endpoint: `X-API-Key`, then
/// `Authorization: Bearer`.
fn api_key_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("X-API-Key").and_then(|v| v.to_str().ok()) {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
}

enum AuthOutcome {
    Ok(McpServer),
    Failed(&'static str),
}

fn authenticate(state: &ServerState, server_id: &str, api_key: Option<String>) -> AuthOutcome {
    let Some(api_key) = api_key else {
        return AuthOutcome::Failed("Missing API key");
    };

    let server = match state.runtime.store.server_by_api_key(&api_key) {
        Ok(Some(server)) => server,
        Ok(None) => return AuthOutcome::Failed("Invalid API key"),
        Err(err) => {
            warn!(server_id, "api key lookup failed: {err}");
            return AuthOutcome::Failed("Invalid API key");
        }
    };

    if !constant_time_eq(&api_key, &server.api_key) {
        return AuthOutcome::Failed("Invalid API key");
    }
    if server.id != server_id {
        return AuthOutcome::Failed("Server ID mismatch");
    }
    AuthOutcome::Ok(server)
}

fn rpc_error(id: Option<RequestId>, error: McpError) -> Response {
    (StatusCode::OK, Json(McpResponse::error(id, error))).into_response()
}

fn rpc_result(id: Option<RequestId>, result: Value) -> Response {
    (StatusCode::OK, Json(McpResponse::success(id, result))).into_response()
}

/// `POST /mcp/{serverId}`: decode, authenticate, rate-limit, dispatch.
pub async fn handle_mcp_request(
    State(state): State<ServerState>,
    Path(server_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let server = match authenticate(&state, &server_id, api_key_from_headers(&headers)) {
        AuthOutcome::Ok(server) => server,
        AuthOutcome::Failed(message) => {
            return rpc_error(None, McpError::InvalidRequest(message.to_string()))
        }
    };

    if !state
        .runtime
        .rate_limiters
        .allow(&server.id, server.config.rate_limit_per_min)
    {
        debug!(server_id = %server.id, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(McpResponse::error(
                None,
                McpError::Internal("Rate limit exceeded".to_string()),
            )),
        )
            .into_response();
    }

    let request: McpRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(_) => return rpc_error(None, McpError::Parse("Invalid JSON".to_string())),
    };

    if request.jsonrpc != JSONRPC_VERSION {
        return rpc_error(
            request.id,
            McpError::InvalidRequest("Invalid JSON-RPC version".to_string()),
        );
    }

    match request.method.as_str() {
        methods::INITIALIZE => handle_initialize(&server, request.id),
        methods::PING => rpc_result(request.id, json!({})),
        methods::TOOLS_LIST => handle_tools_list(&state, &server, request.id),
        methods::TOOLS_CALL => handle_tools_call(&state, &server, request).await,
        other => rpc_error(request.id, McpError::MethodNotFound(other.to_string())),
    }
}

fn handle_initialize(server: &McpServer, id: Option<RequestId>) -> Response {
    rpc_result(
        id,
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": format!("dataweaver-{}", server.name),
                "version": server.version,
            },
        }),
    )
}

fn handle_tools_list(state: &ServerState, server: &McpServer, id: Option<RequestId>) -> Response {
    let tools = executor::server_tools(&state.runtime, server);
    let definitions: Vec<ToolDefinition> = tools
        .into_iter()
        .map(|tool| {
            let parameters = state
                .runtime
                .store
                .query_by_id(&tool.query_id)
                .ok()
                .flatten()
                .map(|query| query.parameters)
                .unwrap_or_default();
            ToolDefinition {
                input_schema: tool.mcp_input_schema(&parameters),
                name: tool.name,
                description: tool.description,
            }
        })
        .collect();

    rpc_result(id, json!({ "tools": definitions }))
}

async fn handle_tools_call(state: &ServerState, server: &McpServer, request: McpRequest) -> Response {
    let Some(params) = request.params else {
        return rpc_error(
            request.id,
            McpError::InvalidParams("Invalid params".to_string()),
        );
    };
    let params: ToolsCallParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(_) => {
            return rpc_error(
                request.id,
                McpError::InvalidParams("Invalid params format".to_string()),
            )
        }
    };
    if params.name.is_empty() {
        return rpc_error(
            request.id,
            McpError::InvalidParams("Missing tool name".to_string()),
        );
    }

    let arguments = params.arguments.unwrap_or_default();

    // Run the pipeline on its own task: a client disconnect drops this
    // handler's future, but the in-flight execution and its log record
    // still run to completion.
    let runtime = state.runtime.clone();
    let server = server.clone();
    let tool_name = params.name.clone();
    let execution = tokio::spawn(async move {
        executor::execute_tool(&runtime, &server, &tool_name, &arguments).await
    });

    match execution.await {
        Ok(Ok(result)) => match serde_json::to_value::<ToolCallResult>(result) {
            Ok(value) => rpc_result(request.id, value),
            Err(err) => rpc_error(request.id, McpError::Internal(err.to_string())),
        },
        Ok(Err(error)) => rpc_error(request.id, error),
        Err(err) => {
            warn!("tool execution task failed: {err}");
            rpc_error(
                request.id,
                McpError::Internal("tool execution failed".to_string()),
            )
        }
    }
}

/// `GET /mcp/{serverId}/sse`: a `connected` event immediately, heartbeats
/// every 30 seconds until the client goes away.
pub async fn handle_mcp_sse(
    State(state): State<ServerState>,
    Path(server_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let api_key = api_key_from_headers(&headers).or_else(|| query.get("api_key").cloned());
    if api_key.is_none() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Missing API key"})),
        )
            .into_response();
    }

    let server = match authenticate(&state, &server_id, api_key) {
        AuthOutcome::Ok(server) => server,
        AuthOutcome::Failed(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Invalid API key"})),
            )
                .into_response()
        }
    };

    let mut response = Sse::new(sse_events(server)).into_response();
    let headers = response.headers_mut();
    headers.insert("Cache-Control", "no-cache".parse().expect("static header"));
    headers.insert("Connection", "keep-alive".parse().expect("static header"));
    headers.insert(
        "Access-Control-Allow-Origin",
        "*".parse().expect("static header"),
    );
    response
}

fn sse_events(server: McpServer) -> impl Stream<Item = Result<Event, Infallible>> {
    let connected = stream::once(async move {
        Ok(Event::default().event("connected").data(
            json!({"server_id": server.id, "version": server.version}).to_string(),
        ))
    });

    let start = tokio::time::Instant::now() + HEARTBEAT_INTERVAL;
    let heartbeats = stream::unfold(
        tokio::time::interval_at(start, HEARTBEAT_INTERVAL),
        |mut interval| async move {
            interval.tick().await;
            let event = Event::default()
                .event("heartbeat")
                .data(json!({"timestamp": Utc::now().timestamp()}).to_string());
            Some((Ok(event), interval))
        },
    );

    connected.chain(heartbeats)
}

/// `GET /mcp/{serverId}/health`: unauthenticated liveness for one server.
pub async fn handle_health(
    State(state): State<ServerState>,
    Path(server_id): Path<String>,
) -> Response {
    match state.runtime.store.server_by_id(&server_id) {
        Ok(Some(server)) => {
            let tools_count = executor::server_tools(&state.runtime, &server).len();
            (
                StatusCode::OK,
                Json(json!({
                    "status": "healthy",
                    "server_id": server.id,
                    "tools_count": tools_count,
                    "timestamp": Utc::now().timestamp(),
                })),
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "error": "Server not found"})),
        )
            .into_response(),
        Err(err) => {
            warn!(server_id, "health lookup failed: {err}");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"status": "error", "error": "Server not found"})),
            )
                .into_response()
        }
    }
}
