//! Per-server rate limiting for MCP requests.
//!
//! Sliding-window counters keyed by server id. All state is in-memory and
//! lost on restart; pruning happens on the allow path so no sweeper task is
//! needed.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window state for a single server.
struct WindowState {
    timestamps: Vec<Instant>,
}

impl WindowState {
    fn new() -> Self {
        Self {
            timestamps: Vec::new(),
        }
    }

    fn allow_at(&mut self, now: Instant, max_requests: usize, window: Duration) -> bool {
        self.timestamps
            .retain(|t| now.duration_since(*t) < window);
        if self.timestamps.len() >= max_requests {
            return false;
        }
        self.timestamps.push(now);
        true
    }
}

/// Registry of per-server sliding windows behind one mutex.
///
/// Entries are created lazily on the first request for a key. The limit is
/// read from the server's config on every call, so a republished server with
/// a new limit takes effect without a restart.
pub struct RateLimiterRegistry {
    window: Duration,
    states: Mutex<HashMap<String, WindowState>>,
}

impl RateLimiterRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and records one request for `key`. A limit of zero or below
    /// means unlimited.
    pub fn allow(&self, key: &str, limit_per_window: i64) -> bool {
        self.allow_at(key, limit_per_window, Instant::now())
    }

    fn allow_at(&self, key: &str, limit_per_window: i64, now: Instant) -> bool {
        if limit_per_window <= 0 {
            return true;
        }

        let mut states = self.states.lock().unwrap();
        let state = states
            .entry(key.to_string())
            .or_insert_with(WindowState::new);
        state.allow_at(now, limit_per_window as usize, self.window)
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
