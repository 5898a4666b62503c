use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the replica set selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Total replica set size (primary + secondaries).
    #[serde(default = "default_replica_set_size")]
    pub replica_set_size: usize,
    /// Per-probe timeout, milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// How many candidates are probed concurrently.
    #[serde(default = "default_probe_parallelism")]
    pub probe_parallelism: usize,
    /// Overall client timeout for selector HTTP calls, seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_replica_set_size() -> usize {
    3
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_probe_parallelism() -> usize {
    10
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Config {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            replica_set_size: default_replica_set_size(),
            probe_timeout_ms: default_probe_timeout_ms(),
            probe_parallelism: default_probe_parallelism(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
