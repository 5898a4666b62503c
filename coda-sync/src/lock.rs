//! Per-user sync lock.
//!
//! A keyed, TTL'd mutual-exclusion token over a shared in-process store.
//! The lock guards the import critical section on a secondary and is
//! advisory on a primary, where the clock-record uniqueness constraint is
//! the real safety net. Read-only probes observe it without acquiring.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;
use uuid::Uuid;

use coda_store::{Error, Result};

const LOCK_PREFIX: &str = "nodeSync";

#[derive(Debug)]
struct Held {
    token: Uuid,
    expires_at: Instant,
}

/// The keyed lock store. Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct SyncLock {
    entries: Arc<Mutex<HashMap<String, Held>>>,
    ttl: Duration,
}

/// Exclusive hold on one wallet's sync lock. Released on drop; dropping
/// twice or after an explicit release is a no-op.
#[derive(Debug)]
pub struct LockGuard {
    lock: SyncLock,
    key: String,
    token: Uuid,
    released: bool,
}

impl SyncLock {
    /// `ttl` must exceed the maximum expected sync duration: an expired
    /// entry is treated as unheld.
    pub fn new(ttl: Duration) -> Self {
        SyncLock {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn key(wallet: &str) -> String {
        format!("{LOCK_PREFIX}:{wallet}")
    }

    /// Acquire the lock for `wallet`. Fails with [`Error::Locked`] when an
    /// unexpired hold exists.
    pub fn acquire(&self, wallet: &str) -> Result<LockGuard> {
        let key = Self::key(wallet);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(held) = entries.get(&key) {
            if held.expires_at > now {
                return Err(Error::Locked(wallet.to_string()));
            }
        }
        let token = Uuid::new_v4();
        entries.insert(
            key.clone(),
            Held {
                token,
                expires_at: now + self.ttl,
            },
        );
        trace!(key = %key, "sync lock acquired");
        Ok(LockGuard {
            lock: self.clone(),
            key,
            token,
            released: false,
        })
    }

    /// Whether an unexpired hold exists for `wallet`.
    pub fn is_held(&self, wallet: &str) -> bool {
        let key = Self::key(wallet);
        let entries = self.entries.lock();
        entries
            .get(&key)
            .map(|held| held.expires_at > Instant::now())
            .unwrap_or(false)
    }

    /// Idempotent: only removes the entry while `token` still owns it.
    fn release(&self, key: &str, token: Uuid) {
        let mut entries = self.entries.lock();
        if entries.get(key).map(|held| held.token) == Some(token) {
            entries.remove(key);
            trace!(key = %key, "sync lock released");
        }
    }
}

impl LockGuard {
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.lock.release(&self.key, self.token);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
