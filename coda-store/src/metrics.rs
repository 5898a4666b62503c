//! Metrics for the record store.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Committed write transactions on the primary path.
    pub writes: Counter,
    /// Export snapshot reads served.
    pub exports: Counter,
    /// Import windows committed.
    pub import_commits: Counter,
}

impl Metrics {
    pub fn register(&self, registry: &mut Registry) {
        let sub = registry.sub_registry_with_prefix("store");
        sub.register("writes", "Committed write transactions", self.writes.clone());
        sub.register("exports", "Export snapshot reads served", self.exports.clone());
        sub.register(
            "import_commits",
            "Replication windows committed",
            self.import_commits.clone(),
        );
    }
}
