//! Metrics for the replication engine.

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub syncs_started: Counter,
    pub syncs_completed: Counter,
    pub syncs_failed: Counter,
    pub sync_noops: Counter,
    pub windows_applied: Counter,
    pub blobs_fetched: Counter,
    pub triggers_enqueued: Counter,
    pub triggers_fired: Counter,
}

impl Metrics {
    pub fn register(&self, registry: &mut Registry) {
        let sub = registry.sub_registry_with_prefix("sync");
        sub.register("started", "Sync runs started", self.syncs_started.clone());
        sub.register(
            "completed",
            "Sync runs completed",
            self.syncs_completed.clone(),
        );
        sub.register("failed", "Sync runs failed", self.syncs_failed.clone());
        sub.register(
            "noops",
            "Sync runs that were already up to date",
            self.sync_noops.clone(),
        );
        sub.register(
            "windows_applied",
            "Export windows applied",
            self.windows_applied.clone(),
        );
        sub.register(
            "blobs_fetched",
            "Blobs downloaded during imports",
            self.blobs_fetched.clone(),
        );
        sub.register(
            "triggers_enqueued",
            "Debounced sync triggers enqueued",
            self.triggers_enqueued.clone(),
        );
        sub.register(
            "triggers_fired",
            "Debounced sync triggers fired",
            self.triggers_fired.clone(),
        );
    }
}
