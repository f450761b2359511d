//! Shared constants for the e2e suite.

pub const TEST_ENCRYPTION_KEY: [u8; 32] = [42u8; 32];
pub const TEST_JWT_SECRET: &str = "e2e-jwt-secret";

pub const SERVER_READY_TIMEOUT_MS: u64 = 5_000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;

pub const LOG_WAIT_TIMEOUT_MS: u64 = 2_000;
