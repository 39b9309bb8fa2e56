use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

/// The arbitrating store behind [`LockManager`](super::manager::LockManager).
///
/// The store is the single source of truth: the manager keeps no local lock
/// state, so at-most-one-holder depends entirely on both operations being
/// atomic from the caller's point of view.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create `key` holding `value` with the given time-to-live, only if the
    /// key is currently absent. Returns `true` when the key was created.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only while it still holds `value`. Returns `true` when
    /// the key was deleted.
    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool>;

    /// Verify the store is reachable.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    /// Release client resources.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`LockStore`] with lazy expiry.
///
/// Arbitrates correctly between the tasks of a single process; tests and
/// single-host deployments use it in place of the Redis backend.
#[derive(Debug, Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(false);
            }
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_match(&self, key: &str, value: &str) -> Result<bool> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now && entry.value == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    const TTL: Duration = Duration::from_millis(100);

    #[test]
    fn absent_key_is_created() {
        let store = MemoryLockStore::new();
        assert!(block_on(store.set_if_absent("lock/a", "t1", TTL)).unwrap());
    }

    #[test]
    fn live_key_blocks_creation() {
        let store = MemoryLockStore::new();
        assert!(block_on(store.set_if_absent("lock/a", "t1", TTL)).unwrap());
        assert!(!block_on(store.set_if_absent("lock/a", "t2", TTL)).unwrap());
    }

    #[test]
    fn expired_key_is_replaced() {
        let store = MemoryLockStore::new();
        assert!(block_on(store.set_if_absent("lock/a", "t1", TTL)).unwrap());
        std::thread::sleep(TTL + Duration::from_millis(20));
        assert!(block_on(store.set_if_absent("lock/a", "t2", TTL)).unwrap());
    }

    #[test]
    fn delete_requires_matching_value() {
        let store = MemoryLockStore::new();
        assert!(block_on(store.set_if_absent("lock/a", "t1", TTL)).unwrap());

        assert!(!block_on(store.delete_if_match("lock/a", "t2")).unwrap());
        assert!(!block_on(store.set_if_absent("lock/a", "t3", TTL)).unwrap());

        assert!(block_on(store.delete_if_match("lock/a", "t1")).unwrap());
        assert!(block_on(store.set_if_absent("lock/a", "t3", TTL)).unwrap());
    }

    #[test]
    fn delete_of_missing_key_reports_false() {
        let store = MemoryLockStore::new();
        assert!(!block_on(store.delete_if_match("lock/missing", "t1")).unwrap());
    }
}
