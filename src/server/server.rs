//! Router assembly and serving.

use anyhow::Result;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::state::ServerState;
use super::{
    auth_routes, datasource_routes, mcp_server_routes, query_routes, tool_routes,
};
use crate::mcp::runtime;
use crate::store::UserStore;

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    // A cheap store round-trip doubles as the database liveness probe.
    let database = match state.store.user_by_id(-1) {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };
    let status = if database == "connected" {
        "healthy"
    } else {
        "degraded"
    };
    Json(json!({"status": status, "database": database}))
}

/// Builds the full application router. Kept separate from serving so the
/// e2e suite can mount it on an ephemeral port.
pub fn make_app(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Runtime endpoints authenticate by API key, not JWT.
    let mcp_routes: Router = Router::new()
        .route("/{serverId}", post(runtime::handle_mcp_request))
        .route("/{serverId}/sse", get(runtime::handle_mcp_sse))
        .route("/{serverId}/health", get(runtime::handle_health))
        .with_state(state.clone());

    let api_routes: Router = Router::new()
        .route("/auth/register", post(auth_routes::register))
        .route("/auth/login", post(auth_routes::login))
        .route("/datasources", get(datasource_routes::list))
        .route("/datasources", post(datasource_routes::create))
        .route("/datasources/test", post(datasource_routes::test_direct))
        .route("/datasources/{id}", get(datasource_routes::get))
        .route("/datasources/{id}", put(datasource_routes::update))
        .route("/datasources/{id}", delete(datasource_routes::delete))
        .route("/datasources/{id}/test", post(datasource_routes::test_by_id))
        .route("/datasources/{id}/tables", get(datasource_routes::tables))
        .route("/queries", get(query_routes::list))
        .route("/queries", post(query_routes::create))
        .route("/queries/{id}", get(query_routes::get))
        .route("/queries/{id}", put(query_routes::update))
        .route("/queries/{id}", delete(query_routes::delete))
        .route("/queries/{id}/execute", post(query_routes::execute))
        .route("/queries/{id}/parameters", get(query_routes::parameters))
        .route("/tools", get(tool_routes::list))
        .route("/tools", post(tool_routes::create))
        .route("/tools/{id}", get(tool_routes::get))
        .route("/tools/{id}", put(tool_routes::update))
        .route("/tools/{id}", delete(tool_routes::delete))
        .route("/mcp-servers", get(mcp_server_routes::list))
        .route("/mcp-servers", post(mcp_server_routes::create))
        .route("/mcp-servers/{id}", get(mcp_server_routes::get))
        .route("/mcp-servers/{id}", put(mcp_server_routes::update))
        .route("/mcp-servers/{id}", delete(mcp_server_routes::delete))
        .route("/mcp-servers/{id}/publish", post(mcp_server_routes::publish))
        .route(
            "/mcp-servers/{id}/unpublish",
            post(mcp_server_routes::unpublish),
        )
        .route("/mcp-servers/{id}/config", get(mcp_server_routes::config))
        .route("/mcp-servers/{id}/logs", get(mcp_server_routes::logs))
        .route(
            "/mcp-servers/{id}/statistics",
            get(mcp_server_routes::statistics),
        )
        .with_state(state.clone());

    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/mcp", mcp_routes)
        .nest("/api/v1", api_routes)
        .layer(cors)
}

/// Binds the port and serves until ctrl-c, then drains the log channel.
pub async fn run_server(state: ServerState, port: u16) -> Result<()> {
    let app = make_app(state.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!("listening on port {port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    state.runtime.shutdown().await;
    info!("log drain flushed, bye");
    Ok(())
}
