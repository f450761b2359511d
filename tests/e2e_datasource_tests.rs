//! End-to-end tests for datasource management.

mod common;

use common::{ApiClient, TestServer};
use dataweaver::store::DatasourceStore;
use reqwest::StatusCode;
use serde_json::{json, Value};

fn datasource_body(name: &str) -> Value {
    json!({
        "name": name,
        "description": "orders warehouse",
        "type": "postgresql",
        "host": "db.example.com",
        "port": 5432,
        "database": "orders",
        "username": "svc",
        "password": "super-secret",
        "ssl_mode": "disable",
    })
}

#[tokio::test]
async fn create_stores_ciphertext_and_hides_password() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let response = client.post("/api/v1/datasources", &datasource_body("orders")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    assert!(body.get("password").is_none());
    assert_eq!(body["type"], "postgresql");

    // At rest the password is AES-GCM ciphertext, not the plaintext.
    let id = body["id"].as_str().unwrap();
    let stored = server.store.datasource_by_id(id).unwrap().unwrap();
    assert_ne!(stored.password, "super-secret");
    assert!(!stored.password.contains("super-secret"));
    assert!(stored.password.len() > 40);
}

#[tokio::test]
async fn unknown_kind_is_rejected() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let mut body = datasource_body("bad");
    body["type"] = json!("mongodb");
    let response = client.post("/api/v1/datasources", &body).await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn update_reencrypts_password() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let created: Value = client
        .post("/api/v1/datasources", &datasource_body("orders"))
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    let before = server.store.datasource_by_id(id).unwrap().unwrap().password;

    let response = client
        .put(
            &format!("/api/v1/datasources/{id}"),
            &json!({"password": "rotated-secret", "description": "rotated"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let after = server.store.datasource_by_id(id).unwrap().unwrap();
    assert_ne!(after.password, before);
    assert_eq!(after.description, "rotated");
}

#[tokio::test]
async fn list_search_and_pagination() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    for name in ["orders-primary", "orders-replica", "analytics"] {
        let response = client.post("/api/v1/datasources", &datasource_body(name)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let body: Value = client.get("/api/v1/datasources").await.json().await.unwrap();
    assert_eq!(body["total"], 3);

    let body: Value = client
        .get("/api/v1/datasources?keyword=ORDERS")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 2);
    assert_eq!(body["items"].as_array().unwrap().len(), 2);

    let body: Value = client
        .get("/api/v1/datasources?page=2&size=2")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 3);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn delete_is_soft_and_idempotent() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    let created: Value = client
        .post("/api/v1/datasources", &datasource_body("orders"))
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    assert_eq!(
        client.delete(&format!("/api/v1/datasources/{id}")).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        client.get(&format!("/api/v1/datasources/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        client.delete(&format!("/api/v1/datasources/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn connection_test_round_trips_through_engine() {
    let server = TestServer::spawn().await;
    let mut client = ApiClient::new(server.base_url.clone());
    client.register_and_login("alice").await;

    // Direct test with request-supplied credentials.
    let body: Value = client
        .post(
            "/api/v1/datasources/test",
            &json!({
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
    assert_eq!(body["success"], true);
    assert!(body["latency_ms"].as_i64().is_some());

    // Stored test decrypts and probes.
    let created: Value = client
        .post("/api/v1/datasources", &datasource_body("orders"))
        .await
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();
    let body: Value = client
        .post(&format!("/api/v1/datasources/{id}/test"), &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);

    // A failing engine reports the failure without raising.
    server.factory.set_outcome(
        dataweaver::dbconnector::stub::StubOutcome::ConnectError("connection refused".into()),
    );
    let body: Value = client
        .post(&format!("/api/v1/datasources/{id}/test"), &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("connection refused"));
}
