//! CID denylist for the read path.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

/// Shared set of blocked CIDs. A blocked CID is refused with 403 before
/// any disk or network access.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    cids: Arc<RwLock<HashSet<String>>>,
}

impl Denylist {
    pub fn new(cids: impl IntoIterator<Item = String>) -> Self {
        Denylist {
            cids: Arc::new(RwLock::new(cids.into_iter().collect())),
        }
    }

    pub async fn is_blocked(&self, cid: &str) -> bool {
        self.cids.read().await.contains(cid)
    }

    pub async fn block(&self, cid: String) {
        info!(cid = %cid, "adding CID to denylist");
        self.cids.write().await.insert(cid);
    }

    pub async fn unblock(&self, cid: &str) {
        self.cids.write().await.remove(cid);
    }
}
