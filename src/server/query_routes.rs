//! Query management endpoints: CRUD plus ad-hoc execution against the
//! query's datasource.

use std::time::Duration;

use axum::extract::{Path, Query as UrlQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use super::datasource_routes::connection_config;
use super::session::Session;
use super::state::ServerState;
use super::ListParams;
use crate::sqlbind;
use crate::store::models::{Query, QueryParam};
use crate::store::{DatasourceStore, QueryStore};

const EXECUTE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct CreateQueryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub datasource_id: String,
    pub sql_template: String,
    #[serde(default)]
    pub parameters: Vec<QueryParam>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueryRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub datasource_id: Option<String>,
    #[serde(default)]
    pub sql_template: Option<String>,
    #[serde(default)]
    pub parameters: Option<Vec<QueryParam>>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
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

impl From<Query> for QueryResponse {
    fn from(query: Query) -> Self {
        Self {
            id: query.id,
            user_id: query.user_id,
            datasource_id: query.datasource_id,
            name: query.name,
            description: query.description,
            sql_template: query.sql_template,
            parameters: query.parameters,
            created_at: query.created_at,
            updated_at: query.updated_at,
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
        Json(json!({"error": "query not found"})),
    )
        .into_response()
}

pub async fn list(
    session: Session,
    State(state): State<ServerState>,
    UrlQuery(params): UrlQuery<ListParams>,
) -> Response {
    let page = params.to_page();
    match state.store.list_queries(session.user_id, &page) {
        Ok((items, total)) => Json(json!({
            "items": items.into_iter().map(QueryResponse::from).collect::<Vec<_>>(),
            "total": total,
            "page": page.page,
            "size": page.size,
        }))
        .into_response(),
        Err(err) => internal_error("query listing failed", err),
    }
}

pub async fn create(
    session: Session,
    State(state): State<ServerState>,
    Json(request): Json<CreateQueryRequest>,
) -> Response {
    if request.name.is_empty() || request.sql_template.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name and sql_template are required"})),
        )
            .into_response();
    }

    match state
        .store
        .datasource_by_id_for_user(&request.datasource_id, session.user_id)
    {
        Ok(Some(_)) => {}
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "datasource not found"})),
            )
                .into_response()
        }
        Err(err) => return internal_error("datasource lookup failed", err),
    }

    let now = Utc::now();
    let query = Query {
        id: Uuid::new_v4().to_string(),
        user_id: session.user_id,
        datasource_id: request.datasource_id,
        name: request.name,
        description: request.description,
        sql_template: request.sql_template,
        parameters: request.parameters,
        created_at: now,
        updated_at: now,
    };

    match state.store.create_query(&query) {
        Ok(()) => (StatusCode::CREATED, Json(QueryResponse::from(query))).into_response(),
        Err(err) => internal_error("query creation failed", err),
    }
}

pub async fn get(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.query_by_id_for_user(&id, session.user_id) {
        Ok(Some(query)) => Json(QueryResponse::from(query)).into_response(),
        Ok(None) => not_found(),
        Err(err) => internal_error("query lookup failed", err),
    }
}

pub async fn update(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateQueryRequest>,
) -> Response {
    let mut query = match state.store.query_by_id_for_user(&id, session.user_id) {
        Ok(Some(query)) => query,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("query lookup failed", err),
    };

    if let Some(datasource_id) = request.datasource_id {
        match state
            .store
            .datasource_by_id_for_user(&datasource_id, session.user_id)
        {
            Ok(Some(_)) => query.datasource_id = datasource_id,
            Ok(None) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "datasource not found"})),
                )
                    .into_response()
            }
            Err(err) => return internal_error("datasource lookup failed", err),
        }
    }
    if let Some(name) = request.name {
        query.name = name;
    }
    if let Some(description) = request.description {
        query.description = description;
    }
    if let Some(sql_template) = request.sql_template {
        query.sql_template = sql_template;
    }
    if let Some(parameters) = request.parameters {
        query.parameters = parameters;
    }

    match state.store.update_query(&query) {
        Ok(true) => Json(QueryResponse::from(query)).into_response(),
        Ok(false) => not_found(),
        Err(err) => internal_error("query update failed", err),
    }
}

pub async fn delete(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_query(&id, session.user_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => internal_error("query deletion failed", err),
    }
}

/// The declared parameter schema of a query.
pub async fn parameters(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.query_by_id_for_user(&id, session.user_id) {
        Ok(Some(query)) => Json(json!({"parameters": query.parameters})).into_response(),
        Ok(None) => not_found(),
        Err(err) => internal_error("query lookup failed", err),
    }
}

/// Runs the query once with the supplied arguments.
pub async fn execute(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<ExecuteQueryRequest>,
) -> Response {
    let query = match state.store.query_by_id_for_user(&id, session.user_id) {
        Ok(Some(query)) => query,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("query lookup failed", err),
    };

    let merged = match crate::mcp::executor::resolve_arguments(&query.parameters, &request.parameters)
    {
        Ok(merged) => merged,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
        }
    };

    let datasource = match state.store.datasource_by_id(&query.datasource_id) {
        Ok(Some(datasource)) => datasource,
        Ok(None) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "datasource not found"})),
            )
                .into_response()
        }
        Err(err) => return internal_error("datasource lookup failed", err),
    };

    let config = match connection_config(&state, &datasource) {
        Ok(config) => config,
        Err(response) => return response,
    };

    let binding = sqlbind::bind(&query.sql_template, &merged, datasource.kind.dialect());

    let connector = match state.runtime.connectors.connect(&config).await {
        Ok(connector) => connector,
        Err(err) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": format!("failed to connect: {err}")})),
            )
                .into_response()
        }
    };

    let outcome =
        tokio::time::timeout(EXECUTE_TIMEOUT, connector.execute(&binding.sql, &binding.values))
            .await;
    connector.close().await;

    match outcome {
        Ok(Ok(result)) => Json(result).into_response(),
        Ok(Err(err)) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": format!("query execution failed: {err}")})),
        )
            .into_response(),
        Err(_) => (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({"error": "query execution timed out"})),
        )
            .into_response(),
    }
}
