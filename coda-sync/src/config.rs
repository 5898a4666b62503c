use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parallelism of blob downloads during an import: track files and
/// non-track files each fetch in batches of this size.
pub const DEFAULT_FETCH_PARALLELISM: usize = 10;

/// Configuration for the replication engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// This node's public endpoint. Never used as a blob gateway for
    /// ourselves, and sent along on export requests so the source knows
    /// who is pulling.
    pub self_endpoint: String,
    /// Gateways to try for blobs after the sync source itself.
    #[serde(default)]
    pub fallback_gateways: Vec<String>,
    #[serde(default = "default_fetch_parallelism")]
    pub fetch_parallelism: usize,
    /// Per-request timeout for node-to-node HTTP calls, seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Sync lock TTL, seconds. Must exceed the longest expected sync.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
    /// Debounce window for secondary sync triggers, milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_fetch_parallelism() -> usize {
    DEFAULT_FETCH_PARALLELISM
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_lock_ttl_secs() -> u64 {
    3600
}

fn default_debounce_ms() -> u64 {
    3000
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            self_endpoint: "http://localhost:4000".to_string(),
            fallback_gateways: Vec::new(),
            fetch_parallelism: DEFAULT_FETCH_PARALLELISM,
            request_timeout_secs: default_request_timeout_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            debounce_ms: default_debounce_ms(),
        }
    }
}
