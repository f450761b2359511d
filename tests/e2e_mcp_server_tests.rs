//! End-to-end tests for the MCP server lifecycle and its management
//! surface: publish/unpublish, versioning, config output, logs and
//! statistics.

mod common;

use common::fixtures::{one_user_row, publish_server, publish_server_for_current_user};
use common::{ApiClient, TestServer};
use dataweaver::dbconnector::stub::StubOutcome;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn publish_requires_at_least_one_tool() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let created: Value = client
        .post("/api/v1/mcp-servers", &json!({"name": "empty"}))
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
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("at least one tool is required"));
}

#[tokio::test]
async fn versions_bump_on_update_and_publish() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    let fixture = publish_server(&mut client, "alice").await;

    // create = 1.0.0, publish bumped to 1.0.1
    let body: Value = client
        .get(&format!("/api/v1/mcp-servers/{}", fixture.server_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["version"], "1.0.1");

    let body: Value = client
        .put(
            &format!("/api/v1/mcp-servers/{}", fixture.server_id),
            &json!({"description": "now with docs"}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["version"], "1.0.2");

    let body: Value = client
        .post(
            &format!("/api/v1/mcp-servers/{}/publish", fixture.server_id),
            &json!({}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["server"]["version"], "1.0.3");
}

#[tokio::test]
async fn api_key_visibility_follows_status() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    let fixture = publish_server(&mut client, "alice").await;

    let body: Value = client
        .get(&format!("/api/v1/mcp-servers/{}", fixture.server_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["api_key"], fixture.api_key.as_str());
    assert!(body["api_key"].as_str().unwrap().starts_with("sk_live_"));
    assert_eq!(body["api_key"].as_str().unwrap().len(), 8 + 64);

    client
        .post(
            &format!("/api/v1/mcp-servers/{}/unpublish", fixture.server_id),
            &json!({}),
        )
        .await;

    let body: Value = client
        .get(&format!("/api/v1/mcp-servers/{}", fixture.server_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "draft");
    assert!(body.get("api_key").is_none());

    // Republish returns the same key.
    let body: Value = client
        .post(
            &format!("/api/v1/mcp-servers/{}/publish", fixture.server_id),
            &json!({}),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["server"]["api_key"], fixture.api_key.as_str());
}

#[tokio::test]
async fn config_output_has_authoritative_env_block() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    let fixture = publish_server(&mut client, "alice").await;

    let body: Value = client
        .get(&format!("/api/v1/mcp-servers/{}/config", fixture.server_id))
        .await
        .json()
        .await
        .unwrap();

    let entry = &body["mcpServers"]["dataweaver-users-api"];
    assert_eq!(entry["command"], "node");
    assert_eq!(entry["args"], json!(["/path/to/mcp-client.js"]));
    assert_eq!(
        entry["env"]["DATAWEAVER_ENDPOINT"],
        format!("{}/mcp/{}", server.base_url, fixture.server_id)
    );
    assert_eq!(entry["env"]["DATAWEAVER_API_KEY"], fixture.api_key.as_str());

    // Draft servers have no config to hand out.
    client
        .post(
            &format!("/api/v1/mcp-servers/{}/unpublish", fixture.server_id),
            &json!({}),
        )
        .await;
    let response = client
        .get(&format!("/api/v1/mcp-servers/{}/config", fixture.server_id))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_server_name_conflicts() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    assert_eq!(
        client
            .post("/api/v1/mcp-servers", &json!({"name": "demo"}))
            .await
            .status(),
        StatusCode::CREATED
    );
    assert_eq!(
        client
            .post("/api/v1/mcp-servers", &json!({"name": "demo"}))
            .await
            .status(),
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn logs_and_statistics_reflect_calls() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    let fixture = publish_server(&mut client, "alice").await;
    server.factory.set_outcome(StubOutcome::Rows(one_user_row()));

    // Two successes and one bad tool name.
    for id in [1, 2] {
        let response = client
            .rpc(
                &fixture.server_id,
                Some(&fixture.api_key),
                &json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": "tools/call",
                    "params": {"name": "get_user_by_id", "arguments": {"id": id}},
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    client
        .rpc(
            &fixture.server_id,
            Some(&fixture.api_key),
            &json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "nope", "arguments": {}},
            }),
        )
        .await;

    server.wait_for_logs(&fixture.server_id, 3).await;

    let body: Value = client
        .get(&format!("/api/v1/mcp-servers/{}/logs", fixture.server_id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 3);

    let stats: Value = client
        .get(&format!(
            "/api/v1/mcp-servers/{}/statistics?days=7",
            fixture.server_id
        ))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_calls"], 3);
    assert_eq!(stats["successful_calls"], 2);
    assert_eq!(stats["failed_calls"], 1);
    let rate = stats["success_rate"].as_f64().unwrap();
    assert!((rate - 66.666).abs() < 0.01, "rate = {rate}");
    assert_eq!(stats["server_id"], fixture.server_id.as_str());

    let top_tools = stats["top_tools"].as_array().unwrap();
    assert_eq!(top_tools[0]["tool_name"], "get_user_by_id");
    assert_eq!(top_tools[0]["call_count"], 2);

    assert_eq!(stats["calls_by_day"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn two_servers_for_one_user() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let first = publish_server_for_current_user(&mut client, "first").await;
    let second = publish_server_for_current_user(&mut client, "second").await;
    assert_ne!(first.api_key, second.api_key);

    // Each key only opens its own server.
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
    let cross: Value = client
        .rpc(&first.server_id, Some(&second.api_key), &ping)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(cross["error"]["message"], "Server ID mismatch");
}
