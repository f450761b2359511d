//! Process configuration.
//!
//! Secrets come from the environment and are validated up front: a missing
//! or wrong-sized encryption key or an empty JWT secret aborts startup.

use anyhow::{bail, Context, Result};

use crate::crypto::KEY_LENGTH;

pub const ENV_ENCRYPTION_KEY: &str = "DATAWEAVER_ENCRYPTION_KEY";
pub const ENV_JWT_SECRET: &str = "DATAWEAVER_JWT_SECRET";
pub const ENV_BASE_URL: &str = "BASE_URL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

#[derive(Clone)]
pub struct AppConfig {
    pub base_url: String,
    pub encryption_key: Vec<u8>,
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let encryption_key = std::env::var(ENV_ENCRYPTION_KEY)
            .with_context(|| format!("{ENV_ENCRYPTION_KEY} is not set"))?
            .into_bytes();
        if encryption_key.len() != KEY_LENGTH {
            bail!(
                "{ENV_ENCRYPTION_KEY} must be exactly {KEY_LENGTH} bytes, got {}",
                encryption_key.len()
            );
        }

        let jwt_secret =
            std::env::var(ENV_JWT_SECRET).with_context(|| format!("{ENV_JWT_SECRET} is not set"))?;
        if jwt_secret.is_empty() {
            bail!("{ENV_JWT_SECRET} must not be empty");
        }

        let base_url =
            std::env::var(ENV_BASE_URL).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            base_url,
            encryption_key,
            jwt_secret,
        })
    }
}
