//! Clock-ordered record store for coda nodes.
//!
//! Every write for a user is appended under a per-user monotonic clock.
//! Rows are never updated in place; replication replays them in ascending
//! clock order on the secondaries.

pub mod blobs;
pub mod config;
pub mod error;
pub mod export;
pub mod metrics;
mod store;
mod tables;
pub mod types;

pub use crate::blobs::BlobStore;
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::export::{ClockInfo, ExportPayload, ExportedUser, PeerHint, WithClock};
pub use crate::store::{normalize_wallet, ImportBatch, NewFile, NewTrack, NewUserMeta, Store};
