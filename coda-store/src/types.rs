//! Row types persisted by the store.
//!
//! All rows are append-only. Values are postcard-encoded in the tables and
//! serialize to JSON on the export wire, so everything here derives plain
//! serde traits.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which content table reserved a clock value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    UserMeta,
    Track,
    File,
}

/// The per-node record of a user.
///
/// `user_uuid` is node-local: two nodes may know the same wallet under
/// different UUIDs. `clock` always equals the highest clock record held
/// for this user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeUser {
    pub user_uuid: Uuid,
    pub wallet: String,
    /// Highest external ledger block that touched this user. Monotonically
    /// non-decreasing.
    pub latest_block_number: Option<u64>,
    pub clock: u64,
    pub created_at: u64,
}

/// Log entry reserving one clock value for one content row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRecord {
    pub source_kind: SourceKind,
    pub created_at: u64,
}

/// A user metadata revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMeta {
    pub metadata_multihash: String,
    /// Canonical metadata JSON as uploaded.
    pub metadata: String,
    pub blockchain_user_id: Option<u64>,
}

/// A track metadata revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub metadata_multihash: String,
    pub metadata: String,
    pub blockchain_track_id: Option<u64>,
    pub cover_art_multihash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Metadata,
    Image,
    Audio,
    /// A directory CID. Carries no blob payload of its own; its entries are
    /// separate `Image` rows pointing back via `dir_multihash`.
    Dir,
}

/// A content-addressed file row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub multihash: String,
    pub storage_path: String,
    pub file_type: FileType,
    /// Set when this file is an entry inside an image directory CID.
    pub dir_multihash: Option<String>,
    /// Entry name inside the directory; required to compose the gateway
    /// path when fetching the blob from a peer.
    pub file_name: Option<String>,
    /// Clock of the track row this file belongs to, when it is a track
    /// segment or transcode.
    pub track_clock: Option<u64>,
}

impl FileRecord {
    pub fn is_track_file(&self) -> bool {
        self.track_clock.is_some()
    }
}

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
