//! End-to-end tests for query and tool management, including ad-hoc query
//! execution through the binder and engine.

mod common;

use common::fixtures::one_user_row;
use common::{ApiClient, TestServer};
use dataweaver::dbconnector::stub::StubOutcome;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn create_datasource(client: &ApiClient) -> String {
    let response = client
        .post(
            "/api/v1/datasources",
            &json!({
                "name": "warehouse",
                "type": "postgresql",
                "host": "db",
                "port": 5432,
                "database": "d",
                "username": "u",
                "password": "p",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn create_query(client: &ApiClient, datasource_id: &str) -> String {
    let response = client
        .post(
            "/api/v1/queries",
            &json!({
                "name": "users by id",
                "datasource_id": datasource_id,
                "sql_template": "SELECT id, name FROM users WHERE id = :id",
                "parameters": [
                    {"name": "id", "type": "int", "required": false, "default": 1}
                ],
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn query_crud_and_parameters() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;
    let datasource_id = create_datasource(&client).await;
    let query_id = create_query(&client, &datasource_id).await;

    let body: Value = client
        .get(&format!("/api/v1/queries/{query_id}/parameters"))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["parameters"][0]["name"], "id");
    assert_eq!(body["parameters"][0]["type"], "int");

    let updated: Value = client
        .put(
            &format!("/api/v1/queries/{query_id}"),
            &json!({"description": "finds one user"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["description"], "finds one user");

    assert_eq!(
        client
            .delete(&format!("/api/v1/queries/{query_id}"))
            .await
            .status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        client.get(&format!("/api/v1/queries/{query_id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn query_create_requires_own_datasource() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let response = client
        .post(
            "/api/v1/queries",
            &json!({
                "name": "q",
                "datasource_id": "not-a-real-id",
                "sql_template": "SELECT 1",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn execute_binds_defaults_and_returns_rows() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;
    let datasource_id = create_datasource(&client).await;
    let query_id = create_query(&client, &datasource_id).await;
    server.factory.set_outcome(StubOutcome::Rows(one_user_row()));

    // No parameters supplied: the declared default fills in.
    let body: Value = client
        .post(&format!("/api/v1/queries/{query_id}/execute"), &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["row_count"], 1);
    assert_eq!(body["columns"], json!(["id", "name"]));
    assert_eq!(body["rows"][0], json!([7, "alice"]));

    let executed = server.factory.executed();
    assert_eq!(executed[0].0, "SELECT id, name FROM users WHERE id = $1");
    assert_eq!(executed[0].1, vec![json!(1)]);

    // Explicit parameters win over defaults.
    client
        .post(
            &format!("/api/v1/queries/{query_id}/execute"),
            &json!({"parameters": {"id": 9}}),
        )
        .await;
    assert_eq!(server.factory.executed()[1].1, vec![json!(9)]);
}

#[tokio::test]
async fn tool_crud_and_name_conflict() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;
    let datasource_id = create_datasource(&client).await;
    let query_id = create_query(&client, &datasource_id).await;

    let tool_body = json!({
        "name": "get_user",
        "description": "fetch one user",
        "query_id": query_id,
    });
    let created = client.post("/api/v1/tools", &tool_body).await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created: Value = created.json().await.unwrap();
    assert_eq!(created["status"], "active");
    // Display name falls back to the name.
    assert_eq!(created["display_name"], "get_user");
    let tool_id = created["id"].as_str().unwrap();

    assert_eq!(
        client.post("/api/v1/tools", &tool_body).await.status(),
        StatusCode::CONFLICT
    );

    let updated: Value = client
        .put(
            &format!("/api/v1/tools/{tool_id}"),
            &json!({"status": "inactive", "display_name": "Get User"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["status"], "inactive");
    assert_eq!(updated["display_name"], "Get User");

    assert_eq!(
        client.delete(&format!("/api/v1/tools/{tool_id}")).await.status(),
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn tool_requires_own_query() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let response = client
        .post(
            "/api/v1/tools",
            &json!({"name": "t", "query_id": "no-such-query"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inactive_tool_blocks_publish() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;
    let datasource_id = create_datasource(&client).await;
    let query_id = create_query(&client, &datasource_id).await;

    let tool: Value = client
        .post(
            "/api/v1/tools",
            &json!({
                "name": "dormant",
                "query_id": query_id,
                "status": "inactive",
            }),
        )
        .await
        .json()
        .await
        .unwrap();

    let created: Value = client
        .post(
            "/api/v1/mcp-servers",
            &json!({"name": "srv", "tool_ids": [tool["id"]]}),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let response = client
        .post(&format!("/api/v1/mcp-servers/{id}/publish"), &json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("not active"));
}
