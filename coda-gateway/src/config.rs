use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 4000;

/// Configuration for the gateway server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// This node's public endpoint, advertised in export peer info.
    pub self_endpoint: String,
    /// Replica peers consulted when a CID misses local disk.
    #[serde(default)]
    pub read_peers: Vec<String>,
    /// Public gateway of the content-addressed network, the read path's
    /// last resort.
    #[serde(default)]
    pub network_gateway: Option<String>,
    /// Deadline for the content network fallback, milliseconds.
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,
    /// Delegate wallets allowed to call `/file_lookup`.
    #[serde(default)]
    pub delegate_wallets: Vec<String>,
    /// CIDs refused by the read path.
    #[serde(default)]
    pub denylist_cids: Vec<String>,
    /// Whole-request timeout applied by the server layer, seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_network_timeout_ms() -> u64 {
    2_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_concurrency_limit() -> usize {
    1024
}

impl Config {
    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: DEFAULT_PORT,
            self_endpoint: format!("http://localhost:{DEFAULT_PORT}"),
            read_peers: Vec::new(),
            network_gateway: None,
            network_timeout_ms: default_network_timeout_ms(),
            delegate_wallets: Vec::new(),
            denylist_cids: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            concurrency_limit: default_concurrency_limit(),
        }
    }
}
