//! MCP server management endpoints, delegating to [`McpServerManager`].

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::session::Session;
use super::state::ServerState;
use super::ListParams;
use crate::manager::{CreateMcpServerRequest, ManagerError, UpdateMcpServerRequest};

fn error_response(context: &str, err: ManagerError) -> Response {
    let status = match &err {
        ManagerError::NotFound => StatusCode::NOT_FOUND,
        ManagerError::NameExists => StatusCode::CONFLICT,
        ManagerError::NoToolsToPublish
        | ManagerError::ToolNotAvailable(_)
        | ManagerError::ToolNotActive(_)
        | ManagerError::NotPublished => StatusCode::BAD_REQUEST,
        ManagerError::Store(store_err) => {
            warn!("{context}: {store_err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

pub async fn list(
    session: Session,
    State(state): State<ServerState>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.to_page();
    match state.manager.list(session.user_id, &page) {
        Ok((items, total)) => Json(json!({
            "items": items,
            "total": total,
            "page": page.page,
            "size": page.size,
        }))
        .into_response(),
        Err(err) => error_response("server listing failed", err),
    }
}

pub async fn create(
    session: Session,
    State(state): State<ServerState>,
    Json(request): Json<CreateMcpServerRequest>,
) -> Response {
    if request.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name is required"})),
        )
            .into_response();
    }
    match state.manager.create(session.user_id, request) {
        Ok(server) => (StatusCode::CREATED, Json(server)).into_response(),
        Err(err) => error_response("server creation failed", err),
    }
}

pub async fn get(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.get(&id, session.user_id) {
        Ok(server) => Json(server).into_response(),
        Err(err) => error_response("server lookup failed", err),
    }
}

pub async fn update(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMcpServerRequest>,
) -> Response {
    match state.manager.update(&id, session.user_id, request) {
        Ok(server) => Json(server).into_response(),
        Err(err) => error_response("server update failed", err),
    }
}

pub async fn delete(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.delete(&id, session.user_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response("server deletion failed", err),
    }
}

pub async fn publish(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.publish(&id, session.user_id) {
        Ok(response) => Json(response).into_response(),
        Err(err) => error_response("server publish failed", err),
    }
}

pub async fn unpublish(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.unpublish(&id, session.user_id) {
        Ok(()) => Json(json!({"status": "draft"})).into_response(),
        Err(err) => error_response("server unpublish failed", err),
    }
}

pub async fn config(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.manager.mcp_config(&id, session.user_id) {
        Ok(config) => Json(config).into_response(),
        Err(err) => error_response("server config failed", err),
    }
}

pub async fn logs(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.to_page();
    match state.manager.logs(&id, session.user_id, &page) {
        Ok((items, total)) => Json(json!({
            "items": items,
            "total": total,
            "page": page.page,
            "size": page.size,
        }))
        .into_response(),
        Err(err) => error_response("log listing failed", err),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatisticsParams {
    #[serde(default)]
    pub days: Option<i64>,
}

pub async fn statistics(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Query(params): Query<StatisticsParams>,
) -> Response {
    match state
        .manager
        .statistics(&id, session.user_id, params.days.unwrap_or(30))
    {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => error_response("statistics failed", err),
    }
}
