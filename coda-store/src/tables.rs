//! Table definitions for the node database.
//!
//! Keys for the per-user record tables are `(user_uuid, clock)` so that a
//! range scan over one user's clock window is a single contiguous read.
//! Values are postcard-encoded.

use redb::TableDefinition;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Maps user uuid to the postcard-encoded [`NodeUser`](crate::types::NodeUser) row.
pub const USERS: TableDefinition<&[u8; 16], &[u8]> = TableDefinition::new("users-v0");
/// Maps lowercased wallet to user uuid.
pub const WALLETS: TableDefinition<&str, &[u8; 16]> = TableDefinition::new("wallets-v0");
/// The append-only clock log: `(user_uuid, clock)` to [`ClockRecord`](crate::types::ClockRecord).
/// An insert that replaces an existing value is a clock conflict.
pub const CLOCK_RECORDS: TableDefinition<(&[u8; 16], u64), &[u8]> =
    TableDefinition::new("clock-records-v0");
pub const USER_METAS: TableDefinition<(&[u8; 16], u64), &[u8]> =
    TableDefinition::new("user-metas-v0");
pub const TRACKS: TableDefinition<(&[u8; 16], u64), &[u8]> = TableDefinition::new("tracks-v0");
pub const FILES: TableDefinition<(&[u8; 16], u64), &[u8]> = TableDefinition::new("files-v0");
/// Maps CID to the `(user_uuid, clock)` of its file row, for the read path.
pub const CIDS: TableDefinition<&str, (&[u8; 16], u64)> = TableDefinition::new("cids-v0");
/// Maps `(dir_cid, file_name)` to the `(user_uuid, clock)` of the entry row.
pub const DIR_ENTRIES: TableDefinition<(&str, &str), (&[u8; 16], u64)> =
    TableDefinition::new("dir-entries-v0");

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(postcard::to_stdvec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(postcard::from_bytes(bytes)?)
}
