//! Datasource management endpoints.
//!
//! Passwords are encrypted before they touch the store and never leave
//! through a response.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::session::Session;
use super::state::ServerState;
use super::ListParams;
use crate::dbconnector::{self, ConnectionConfig, DataSourceKind};
use crate::store::models::{DataSource, EntityStatus};
use crate::store::DatasourceStore;

#[derive(Debug, Deserialize)]
pub struct CreateDataSourceRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: DataSourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDataSourceRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<DataSourceKind>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_mode: Option<String>,
    #[serde(default)]
    pub status: Option<EntityStatus>,
}

/// Connection details for a direct test, before anything is stored.
#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    #[serde(rename = "type")]
    pub kind: DataSourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl_mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DataSourceResponse {
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: DataSourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub ssl_mode: String,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DataSource> for DataSourceResponse {
    fn from(ds: DataSource) -> Self {
        Self {
            id: ds.id,
            user_id: ds.user_id,
            name: ds.name,
            description: ds.description,
            kind: ds.kind,
            host: ds.host,
            port: ds.port,
            database: ds.database,
            username: ds.username,
            ssl_mode: ds.ssl_mode,
            status: ds.status,
            created_at: ds.created_at,
            updated_at: ds.updated_at,
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
        Json(json!({"error": "datasource not found"})),
    )
        .into_response()
}

pub async fn list(
    session: Session,
    State(state): State<ServerState>,
    Query(params): Query<ListParams>,
) -> Response {
    let page = params.to_page();
    match state.store.list_datasources(session.user_id, &page) {
        Ok((items, total)) => Json(json!({
            "items": items.into_iter().map(DataSourceResponse::from).collect::<Vec<_>>(),
            "total": total,
            "page": page.page,
            "size": page.size,
        }))
        .into_response(),
        Err(err) => internal_error("datasource listing failed", err),
    }
}

pub async fn create(
    session: Session,
    State(state): State<ServerState>,
    Json(request): Json<CreateDataSourceRequest>,
) -> Response {
    if request.name.is_empty() || request.host.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "name and host are required"})),
        )
            .into_response();
    }

    let now = Utc::now();
    let datasource = DataSource {
        id: Uuid::new_v4().to_string(),
        user_id: session.user_id,
        name: request.name,
        description: request.description,
        kind: request.kind,
        host: request.host,
        port: request.port,
        database: request.database,
        username: request.username,
        password: state.runtime.cipher.encrypt(&request.password),
        ssl_mode: request.ssl_mode.unwrap_or_else(|| "disable".to_string()),
        status: EntityStatus::Active,
        created_at: now,
        updated_at: now,
    };

    match state.store.create_datasource(&datasource) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(DataSourceResponse::from(datasource)),
        )
            .into_response(),
        Err(err) => internal_error("datasource creation failed", err),
    }
}

pub async fn get(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.datasource_by_id_for_user(&id, session.user_id) {
        Ok(Some(datasource)) => Json(DataSourceResponse::from(datasource)).into_response(),
        Ok(None) => not_found(),
        Err(err) => internal_error("datasource lookup failed", err),
    }
}

pub async fn update(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateDataSourceRequest>,
) -> Response {
    let mut datasource = match state.store.datasource_by_id_for_user(&id, session.user_id) {
        Ok(Some(datasource)) => datasource,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("datasource lookup failed", err),
    };

    if let Some(name) = request.name {
        datasource.name = name;
    }
    if let Some(description) = request.description {
        datasource.description = description;
    }
    if let Some(kind) = request.kind {
        datasource.kind = kind;
    }
    if let Some(host) = request.host {
        datasource.host = host;
    }
    if let Some(port) = request.port {
        datasource.port = port;
    }
    if let Some(database) = request.database {
        datasource.database = database;
    }
    if let Some(username) = request.username {
        datasource.username = username;
    }
    if let Some(password) = request.password {
        datasource.password = state.runtime.cipher.encrypt(&password);
    }
    if let Some(ssl_mode) = request.ssl_mode {
        datasource.ssl_mode = ssl_mode;
    }
    if let Some(status) = request.status {
        datasource.status = status;
    }

    match state.store.update_datasource(&datasource) {
        Ok(true) => Json(DataSourceResponse::from(datasource)).into_response(),
        Ok(false) => not_found(),
        Err(err) => internal_error("datasource update failed", err),
    }
}

pub async fn delete(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    match state.store.delete_datasource(&id, session.user_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(),
        Err(err) => internal_error("datasource deletion failed", err),
    }
}

/// Probe a connection from request-supplied details, nothing stored.
pub async fn test_direct(
    _session: Session,
    State(state): State<ServerState>,
    Json(request): Json<TestConnectionRequest>,
) -> Response {
    let config = ConnectionConfig {
        kind: request.kind,
        host: request.host,
        port: request.port,
        username: request.username,
        password: request.password,
        database: request.database,
        ssl_mode: request.ssl_mode,
    };
    let result = dbconnector::test_connection(state.runtime.connectors.as_ref(), &config).await;
    Json(result).into_response()
}

/// Probe a stored datasource, decrypting its password for the attempt.
pub async fn test_by_id(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    let datasource = match state.store.datasource_by_id_for_user(&id, session.user_id) {
        Ok(Some(datasource)) => datasource,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("datasource lookup failed", err),
    };

    let config = match connection_config(&state, &datasource) {
        Ok(config) => config,
        Err(response) => return response,
    };
    let result = dbconnector::test_connection(state.runtime.connectors.as_ref(), &config).await;
    Json(result).into_response()
}

/// Tables and columns of a stored datasource.
pub async fn tables(
    session: Session,
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Response {
    let datasource = match state.store.datasource_by_id_for_user(&id, session.user_id) {
        Ok(Some(datasource)) => datasource,
        Ok(None) => return not_found(),
        Err(err) => return internal_error("datasource lookup failed", err),
    };

    let config = match connection_config(&state, &datasource) {
        Ok(config) => config,
        Err(response) => return response,
    };

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

    let outcome = connector.schema().await;
    connector.close().await;
    match outcome {
        Ok(tables) => Json(json!({"tables": tables})).into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": format!("schema introspection failed: {err}")})),
        )
            .into_response(),
    }
}

pub(crate) fn connection_config(
    state: &ServerState,
    datasource: &DataSource,
) -> Result<ConnectionConfig, Response> {
    let password = state.runtime.cipher.decrypt(&datasource.password).map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "failed to decrypt datasource password"})),
        )
            .into_response()
    })?;
    Ok(ConnectionConfig {
        kind: datasource.kind,
        host: datasource.host.clone(),
        port: datasource.port,
        username: datasource.username.clone(),
        password,
        database: datasource.database.clone(),
        ssl_mode: Some(datasource.ssl_mode.clone()),
    })
}
