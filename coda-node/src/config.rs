use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the optional config file in the working directory.
pub const CONFIG_FILE_NAME: &str = "coda.config.toml";
/// Environment prefix for overrides, e.g. `CODA_GATEWAY__PORT=4001`.
pub const ENV_PREFIX: &str = "CODA";

/// Top-level node configuration, one section per component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub store: coda_store::Config,
    #[serde(default)]
    pub sync: coda_sync::Config,
    #[serde(default)]
    pub gateway: coda_gateway::Config,
    #[serde(default)]
    pub selector: coda_selector::Config,
}

impl NodeConfig {
    /// Load from an optional TOML file with `CODA_*` environment
    /// overrides layered on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new(CONFIG_FILE_NAME)).required(false));
        }
        let loaded = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("reading configuration")?;
        let mut config: NodeConfig = loaded
            .try_deserialize()
            .context("deserializing configuration")?;
        config.reconcile();
        Ok(config)
    }

    /// Cross-wire the sections that must agree: the replication engine
    /// advertises the gateway's public endpoint.
    pub fn reconcile(&mut self) {
        self.sync.self_endpoint = self.gateway.self_endpoint.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_reconcile() {
        let mut config = NodeConfig::default();
        config.gateway.self_endpoint = "http://node-a:4000".to_string();
        config.reconcile();
        assert_eq!(config.sync.self_endpoint, "http://node-a:4000");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coda.config.toml");
        std::fs::write(
            &path,
            r#"
            [store]
            path = "/data/db"
            storage_root = "/data/blobs"
            max_export_range = 500

            [gateway]
            port = 4100
            self_endpoint = "http://node-b:4100"
            "#,
        )
        .unwrap();

        let config = NodeConfig::load(Some(&path)).unwrap();
        assert_eq!(config.store.max_export_range, 500);
        assert_eq!(config.gateway.port, 4100);
        assert_eq!(config.sync.self_endpoint, "http://node-b:4100");
    }
}
