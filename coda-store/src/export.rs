//! Wire types for the replication export.
//!
//! An export is a snapshot read of one clock window for a set of users.
//! The importer on a secondary replays the rows in ascending clock order,
//! so every record set is sorted before it leaves the store.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{ClockRecord, FileRecord, NodeUser, Track, UserMeta};

/// A row paired with the clock value that reserved it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithClock<T> {
    pub clock: u64,
    pub data: T,
}

impl<T> WithClock<T> {
    pub fn new(clock: u64, data: T) -> Self {
        WithClock { clock, data }
    }
}

/// Window bookkeeping for one exported user.
///
/// `local_clock_max` carries the user's true clock. When it exceeds
/// `requested_clock_range_max` the importer knows to come back for another
/// window once this one is applied; the `NodeUser.clock` in the payload is
/// clamped to the window and never signals past the returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockInfo {
    pub requested_clock_range_min: u64,
    pub requested_clock_range_max: u64,
    pub local_clock_max: u64,
}

/// One user's slice of an export window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportedUser {
    pub user: NodeUser,
    pub clock_records: Vec<WithClock<ClockRecord>>,
    pub user_metas: Vec<WithClock<UserMeta>>,
    pub tracks: Vec<WithClock<Track>>,
    pub files: Vec<WithClock<FileRecord>>,
    pub clock_info: ClockInfo,
}

/// Advisory peer-to-peer connection hint. Failing to reach one is logged,
/// never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHint {
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub cnode_users: HashMap<Uuid, ExportedUser>,
    #[serde(default)]
    pub peer_info: Vec<PeerHint>,
}

impl ExportPayload {
    /// The slice for `wallet`, if the source holds any records for it.
    pub fn user_for_wallet(&self, wallet: &str) -> Option<&ExportedUser> {
        self.cnode_users.values().find(|u| u.user.wallet == wallet)
    }
}
