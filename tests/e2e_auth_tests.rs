//! End-to-end tests for registration, login and JWT protection.

mod common;

use common::{ApiClient, TestServer};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn register_login_and_access() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());

    let login = client.register_and_login("alice").await;
    assert_eq!(login["user"]["username"], "alice");
    assert!(login["user"].get("password_hash").is_none());

    let response = client.get("/api/v1/datasources").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let server = TestServer::spawn().await;
    let client = ApiClient::new(server.base_url.clone());

    let body = json!({
        "username": "alice",
        "email": "alice@example.com",
        "password": "correct-horse-battery",
    });
    assert_eq!(
        client.post("/api/v1/auth/register", &body).await.status(),
        StatusCode::CREATED
    );
    assert_eq!(
        client.post("/api/v1/auth/register", &body).await.status(),
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn short_password_is_rejected() {
    let server = TestServer::spawn().await;
    let client = ApiClient::new(server.base_url.clone());

    let response = client
        .post(
            "/api/v1/auth/register",
            &json!({"username": "bob", "email": "bob@example.com", "password": "short"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let response = client
        .post(
            "/api/v1/auth/login",
            &json!({"username": "alice", "password": "not-the-password"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .post(
            "/api/v1/auth/login",
            &json!({"username": "nobody", "password": "whatever-long"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn management_routes_require_token() {
    let server = TestServer::spawn().await;
    let client = ApiClient::new(server.base_url.clone());

    let response = client.get("/api/v1/datasources").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut bad = ApiClient::new(server.base_url.clone());
    bad.set_token("not.a.valid.jwt");
    let response = bad.get("/api/v1/mcp-servers").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ownership_is_scoped_per_user() {
    let server = TestServer::spawn().await;

    let mut alice = ApiClient::new(server.base_url.clone());
    alice.register_and_login("alice").await;
    let created: Value = alice
        .post(
            "/api/v1/datasources",
            &json!({
                "name": "alice-db",
                "type": "mysql",
                "host": "db",
                "port": 3306,
                "database": "d",
                "username": "u",
                "password": "p",
            }),
        )
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let mut bob = ApiClient::new(server.base_url.clone());
    bob.register_and_login("bob").await;
    let response = bob.get(&format!("/api/v1/datasources/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
