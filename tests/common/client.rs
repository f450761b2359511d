//! Thin HTTP client helpers over reqwest.

use reqwest::{Response, StatusCode};
use serde_json::{json, Value};

pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            token: None,
        }
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(token.into());
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.header("Authorization", format!("Bearer {}", token)),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.authorized(self.http.get(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("request failed")
    }

    pub async fn post(&self, path: &str, body: &Value) -> Response {
        self.authorized(self.http.post(format!("{}{}", self.base_url, path)))
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn put(&self, path: &str, body: &Value) -> Response {
        self.authorized(self.http.put(format!("{}{}", self.base_url, path)))
            .json(body)
            .send()
            .await
            .expect("request failed")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.authorized(self.http.delete(format!("{}{}", self.base_url, path)))
            .send()
            .await
            .expect("request failed")
    }

    /// Registers and logs in a fresh user, keeping the JWT for later calls.
    pub async fn register_and_login(&mut self, username: &str) -> Value {
        let register = self
            .post(
                "/api/v1/auth/register",
                &json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": "correct-horse-battery",
                }),
            )
            .await;
        assert_eq!(register.status(), StatusCode::CREATED);

        let login = self
            .post(
                "/api/v1/auth/login",
                &json!({"username": username, "password": "correct-horse-battery"}),
            )
            .await;
        assert_eq!(login.status(), StatusCode::OK);
        let body: Value = login.json().await.expect("login body");
        self.set_token(body["token"].as_str().expect("token"));
        body
    }

    /// Sends one JSON-RPC request to a published MCP endpoint.
    pub async fn rpc(&self, server_id: &str, api_key: Option<&str>, body: &Value) -> Response {
        let mut builder = self
            .http
            .post(format!("{}/mcp/{}", self.base_url, server_id))
            .json(body);
        if let Some(key) = api_key {
            builder = builder.header("X-API-Key", key);
        }
        builder.send().await.expect("rpc request failed")
    }

    /// Same call but authenticated with `Authorization: Bearer`.
    pub async fn rpc_bearer(&self, server_id: &str, api_key: &str, body: &Value) -> Response {
        self.http
            .post(format!("{}/mcp/{}", self.base_url, server_id))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(body)
            .send()
            .await
            .expect("rpc request failed")
    }
}
