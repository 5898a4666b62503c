//! Node-to-node wire types for the sync routes.

use serde::{Deserialize, Serialize};

/// Body of `POST /sync`: ask this node to pull the listed wallets from
/// `creator_node_endpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub wallet: Vec<String>,
    pub creator_node_endpoint: String,
    /// Run the import inline and return its outcome instead of queueing.
    #[serde(default)]
    pub immediate: bool,
    #[serde(default)]
    pub sync_type: Option<String>,
}

/// Reply to `POST /sync`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub status: SyncStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<WalletClock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Queued,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletClock {
    pub wallet: String,
    pub clock: u64,
}

/// Reply to `GET /sync_status/:wallet`.
///
/// `clock_value` is `-1` when the node holds no records for the wallet,
/// matching the numeric convention importers use for "absent".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub wallet: String,
    pub latest_block_number: Option<u64>,
    pub clock_value: i64,
}
