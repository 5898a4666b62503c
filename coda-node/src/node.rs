use std::sync::Arc;

use anyhow::Result;
use prometheus_client::registry::Registry;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use coda_gateway::Core;
use coda_store::Store;
use coda_sync::{Importer, SyncLock, SyncTrigger};

use crate::config::NodeConfig;

/// A fully wired content node, not yet serving.
#[derive(Debug)]
pub struct Node {
    pub core: Core,
    pub store: Store,
    pub importer: Importer,
    pub trigger: SyncTrigger,
    trigger_worker: JoinHandle<()>,
}

impl Node {
    /// Build every component and wire them together. When `registry` is
    /// given, all component metrics are registered into it and served on
    /// `/metrics`.
    pub async fn build(
        config: NodeConfig,
        registry: Option<Arc<Mutex<Registry>>>,
    ) -> Result<Self> {
        let store = Store::open(config.store.clone()).await?;
        let lock = SyncLock::new(config.sync.lock_ttl());
        let importer = Importer::new(store.clone(), lock.clone(), config.sync.clone())?;
        let sync_metrics = importer.metrics().clone();
        let (trigger, trigger_worker) = SyncTrigger::spawn(
            config.sync.debounce(),
            config.sync.request_timeout(),
            sync_metrics.clone(),
        )?;

        let core = Core::new(
            config.gateway.clone(),
            store.clone(),
            lock,
            importer.clone(),
            trigger.clone(),
            registry.clone(),
        )?;

        if let Some(registry) = registry {
            let mut registry = registry.lock().await;
            store.metrics().register(&mut registry);
            sync_metrics.register(&mut registry);
            core.state().metrics.register(&mut registry);
        }

        debug!("node components wired");
        Ok(Node {
            core,
            store,
            importer,
            trigger,
            trigger_worker,
        })
    }

    /// Serve the gateway until it exits.
    pub async fn run(self) -> Result<()> {
        let result = self.core.serve().await;
        self.trigger_worker.abort();
        result
    }
}
