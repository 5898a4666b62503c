//! Replication engine for coda nodes.
//!
//! Secondaries converge on their primary by pulling bounded clock windows
//! over the export endpoint and applying them atomically. Writes on the
//! primary enqueue debounced triggers that ask each secondary to pull.
//!
//! The trigger queue is process-local and not persisted: pending triggers
//! are lost on restart and re-created by the next write for the wallet.

pub mod config;
pub mod importer;
pub mod lock;
pub mod metrics;
pub mod protocol;
pub mod trigger;

pub use crate::config::Config;
pub use crate::importer::{Importer, SyncOutcome, SyncPhase, WalletSyncResult};
pub use crate::lock::{LockGuard, SyncLock};
pub use crate::protocol::{SyncRequest, SyncResponse};
pub use crate::trigger::SyncTrigger;
