//! Test harness shared by the e2e suites.

pub mod client;
pub mod constants;
pub mod fixtures;
pub mod server;

pub use client::ApiClient;
pub use server::TestServer;
