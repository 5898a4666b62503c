//! Metrics for the gateway.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub requests: Counter,
    pub reads_local: Counter,
    pub reads_peer: Counter,
    pub reads_network: Counter,
    pub reads_failed: Counter,
    pub uploads: Counter,
}

impl Metrics {
    pub fn register(&self, registry: &mut Registry) {
        let sub = registry.sub_registry_with_prefix("gateway");
        sub.register("requests", "Requests received", self.requests.clone());
        sub.register(
            "reads_local",
            "CID reads served from local disk",
            self.reads_local.clone(),
        );
        sub.register(
            "reads_peer",
            "CID reads recovered from replica peers",
            self.reads_peer.clone(),
        );
        sub.register(
            "reads_network",
            "CID reads recovered from the content network",
            self.reads_network.clone(),
        );
        sub.register(
            "reads_failed",
            "CID reads that failed every fallback",
            self.reads_failed.clone(),
        );
        sub.register("uploads", "Content uploads accepted", self.uploads.clone());
    }
}
