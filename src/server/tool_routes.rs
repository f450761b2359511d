//! Tool management endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use super::session::Session;
use super::state::ServerState;
use super::ListParams;
use crate::store::models::{EntityStatus, Tool};
use crate::store::{QueryStore, StoreError, ToolStore};

#[derive(Debug, Deserialize)]
pub struct CreateToolRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub query_id: String,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateToolRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub input_schema: Option<Value>,
    #[serde(default)]
    pub status: Option<EntityStatus>,
}

#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub id: String,
    pub user_id: i64,
    pub query_id: String,
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tool> for ToolResponse {
    fn from(tool: Tool) -> Self {
        Self {
            id: tool.id,
            user_id: tool.user_id,
            query_id: tool.query_id,
            name: tool.name,
            display_name: tool.display_name,
            description: tool.description,
            input_schema: tool.input_schema,
            status: tool.status,
            created_at: tool.created_at,
            updated_at: tool.updated_at,
        }
    }
}

fn internal_error(context: &str, err: impl std::fmt::Display) -> Response {
    warn!("{context}: {err}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "tool not found"})),
    )
        .into_response()
}

fn name_conflict() -> Response {
    (
        StatusCode::CONFLICT,
        Json(json!({"error": "tool name already exists"})),
    )
        .into_response()
}

pub async fn list(
    session: Session,
    State(state): State<ServerState>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.to_page();
    match state.store.list_tools(session.user_id, &page) {
        Ok((items, total)) => Json(json!({
            "items": items.into_iter().map(ToolResponse::from).collect::<Vec<_>>(),
            "total": total,
            "page": page.page,
            "size": page.size,
        }))
        .into_response(),
        Err(err) => internal_error("tool listing failed", err),
    }
}

pub async fn create(
    session: Session,
    State(state): State<ServerState>,
    Json(request): Json<CreateToolRequest>,
) -> Response {
    if request.name.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name is required"})),
        )
            .into_response();
    }

    match state.store.query_by_id_for_user(&request.query_id, session.user_id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "query not found"})),
            )
                .into_response()
        }
        Err(err) => return internal_error("query lookup failed", err),
    }

    let now = Utc::now();
    let display_name = if request.display_name.is_empty() {
        request.name.clone()
    } else {
        request.display_name
    };
    let tool = Tool {
        id: Uuid::new_v4().to_string(),
        user_id: session.user_id,
        query_id: request.query_id,
        name: request.name,
        display_name,
        description: request.description,
        input_schema: request.input_schema,
        status: request.status.unwrap_or(EntityStatus::Active),
        created_at: now,
        updated_at: now,
    };

    match state.store.create_tool(&tool) {
        Ok(()) => (StatusCode::CREATED, Json(ToolResponse::from(tool))).into_response(),
        Err(StoreError::Conflict(_)) => name_conflict(),
        Err(err) => internal_error("tool creation failed", err),
    }
}

pub async fn get(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.tool_by_id_for_user(&id, session.user_id) {
        Ok(Some(tool)) => Json(ToolResponse::from(tool)).into_response(),
        Ok(None) => not_found(),
        Err(err) => internal_error("tool lookup failed", err),
    }
}

pub async fn update(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateToolRequest>,
) -> Response {
    let mut tool = match state.store.tool_by_id_for_user(&id, session.user_id) {
        Ok(Some(tool)) => tool,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("tool lookup failed", err),
    };

    if let Some(query_id) = request.query_id {
        match state.store.query_by_id_for_user(&query_id, session.user_id) {
            Ok(Some(_)) => tool.query_id = query_id,
            Ok(None) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "query not found"})),
                )
                    .into_response()
            }
            Err(err) => return internal_error("query lookup failed", err),
        }
    }
    if let Some(name) = request.name {
        tool.name = name;
    }
    if let Some(display_name) = request.display_name {
        tool.display_name = display_name;
    }
    if let Some(description) = request.description {
        tool.description = description;
    }
    if let Some(input_schema) = request.input_schema {
        tool.input_schema = Some(input_schema);
    }
    if let Some(status) = request.status {
        tool.status = status;
    }

    match state.store.update_tool(&tool) {
        Ok(true) => Json(ToolResponse::from(tool)).into_response(),
        Ok(false) => not_found(),
        Err(StoreError::Conflict(_)) => name_conflict(),
        Err(err) => internal_error("tool update failed", err),
    }
}

pub async fn delete(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_tool(&id, session.user_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => internal_error("tool deletion failed", err),
    }
}
