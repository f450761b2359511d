//! HTTP server assembly: routes, state, sessions.

mod auth_routes;
mod datasource_routes;
mod mcp_server_routes;
mod query_routes;
#[allow(clippy::module_inception)]
pub mod server;
pub mod session;
pub mod state;
mod tool_routes;

pub use server::{make_app, run_server};

use serde::Deserialize;

use crate::store::Page;

/// Common list-endpoint query string: `?page=&size=&keyword=`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl ListParams {
    pub fn to_page(&self) -> Page {
        Page::new(
            self.page.unwrap_or(1),
            self.size.unwrap_or(20),
            self.keyword.clone(),
        )
    }
}
