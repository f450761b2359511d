//! High-level scenario builders driving the management API.

use reqwest::StatusCode;
use serde_json::{json, Value};

use super::client::ApiClient;

pub struct PublishedFixture {
    pub server_id: String,
    pub api_key: String,
    pub tool_name: String,
    pub datasource_id: String,
    pub query_id: String,
    pub tool_id: String,
}

/// Registers a user and builds datasource → query → tool → published
/// server, returning the handles the runtime tests need.
pub async fn publish_server(client: &mut ApiClient, username: &str) -> PublishedFixture {
    client.register_and_login(username).await;
    publish_named_server(client, "users-api", "get_user_by_id").await
}

/// Like [`publish_server`] for an already-authenticated user; the tool name
/// is derived from the server name so fixtures don't collide per owner.
pub async fn publish_server_for_current_user(
    client: &mut ApiClient,
    server_name: &str,
) -> PublishedFixture {
    let tool_name = format!("{}_lookup", server_name.replace('-', "_"));
    publish_named_server(client, server_name, &tool_name).await
}

async fn publish_named_server(
    client: &mut ApiClient,
    server_name: &str,
    tool_name: &str,
) -> PublishedFixture {
    let datasource = client
        .post(
            "/api/v1/datasources",
            &json!({
                "name": format!("{server_name}-db"),
                "type": "postgresql",
                "host": "db.example.com",
                "port": 5432,
                "database": "appdb",
                "username": "svc",
                "password": "super-secret",
            }),
        )
        .await;
    assert_eq!(datasource.status(), StatusCode::CREATED);
    let datasource: Value = datasource.json().await.unwrap();
    let datasource_id = datasource["id"].as_str().unwrap().to_string();

    let query = client
        .post(
            "/api/v1/queries",
            &json!({
                "name": format!("{server_name}-query"),
                "datasource_id": datasource_id.clone(),
                "sql_template": "SELECT id, name FROM users WHERE id = :id",
                "parameters": [
                    {"name": "id", "type": "int", "required": true}
                ],
            }),
        )
        .await;
    assert_eq!(query.status(), StatusCode::CREATED);
    let query: Value = query.json().await.unwrap();
    let query_id = query["id"].as_str().unwrap().to_string();

    let tool = client
        .post(
            "/api/v1/tools",
            &json!({
                "name": tool_name,
                "display_name": "Get User By Id",
                "description": "Looks up a single user by id",
                "query_id": query_id.clone(),
            }),
        )
        .await;
    assert_eq!(tool.status(), StatusCode::CREATED);
    let tool: Value = tool.json().await.unwrap();
    let tool_id = tool["id"].as_str().unwrap().to_string();

    let server = client
        .post(
            "/api/v1/mcp-servers",
            &json!({
                "name": server_name,
                "tool_ids": [tool_id.clone()],
                "config": {
                    "timeout_seconds": 5,
                    "rate_limit_per_min": 0,
                    "log_level": "info",
                    "enable_caching": false,
                },
            }),
        )
        .await;
    assert_eq!(server.status(), StatusCode::CREATED);
    let server: Value = server.json().await.unwrap();
    let server_id = server["id"].as_str().unwrap().to_string();

    let published = client
        .post(&format!("/api/v1/mcp-servers/{server_id}/publish"), &json!({}))
        .await;
    assert_eq!(published.status(), StatusCode::OK);
    let published: Value = published.json().await.unwrap();
    let api_key = published["server"]["api_key"].as_str().unwrap().to_string();

    PublishedFixture {
        server_id,
        api_key,
        tool_name: tool_name.to_string(),
        datasource_id,
        query_id,
        tool_id,
    }
}

/// A single-row result the stub engine replays for the happy path.
pub fn one_user_row() -> dataweaver::dbconnector::QueryResult {
    dataweaver::dbconnector::QueryResult {
        columns: vec!["id".into(), "name".into()],
        rows: vec![vec![json!(7), json!("alice")]],
        row_count: 1,
    }
}
