//! Shared caches with versioned entries
//!
//! A caller takes a [`Ticket`] before issuing the read whose result it will
//! store. A commit only lands when its ticket is newer than the entry's
//! current version, so a slow response never overwrites a fresher one.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Monotonic sequence number ordering writes to a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn sequence(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub version: Ticket,
    pub updated_at: DateTime<Utc>,
}

pub struct VersionedCache<K, V> {
    sequence: AtomicU64,
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for VersionedCache<K, V> {
    fn default() -> Self {
        Self {
            sequence: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> VersionedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a version for a read about to be issued
    pub fn ticket(&self) -> Ticket {
        Ticket(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Store `value` unless a newer ticket already committed for `key`.
    ///
    /// Returns whether the value was stored.
    pub fn commit(&self, key: K, ticket: Ticket, value: V) -> bool {
        let mut entries = self.entries.write();
        if let Some(current) = entries.get(&key) {
            if current.version >= ticket {
                return false;
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                version: ticket,
                updated_at: Utc::now(),
            },
        );
        true
    }

    /// Take a ticket and commit in one step, for values known to be current
    pub fn put(&self, key: K, value: V) -> Ticket {
        let ticket = self.ticket();
        self.commit(key, ticket, value);
        ticket
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).map(|entry| entry.value.clone())
    }

    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.read().get(key).cloned()
    }

    /// Drop `key` unless a write newer than `ticket` already landed
    pub fn invalidate(&self, key: &K, ticket: Ticket) -> bool {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(current) if current.version < ticket => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_stale_commit_is_rejected() {
        let cache = VersionedCache::new();
        let slow = cache.ticket();
        let fast = cache.ticket();

        assert!(cache.commit("wallet", fast, 200u128));
        assert!(!cache.commit("wallet", slow, 100u128));
        assert_eq!(cache.get(&"wallet"), Some(200));
        assert_eq!(cache.entry(&"wallet").unwrap().version, fast);
    }

    #[test]
    fn test_invalidate_respects_newer_writes() {
        let cache = VersionedCache::new();
        let before = cache.ticket();
        cache.put("pair", 1u8);
        assert!(!cache.invalidate(&"pair", before));
        let after = cache.ticket();
        assert!(cache.invalidate(&"pair", after));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_completions_keep_latest_request() {
        let cache: Arc<VersionedCache<&str, u32>> = Arc::new(VersionedCache::new());
        let mut tasks = Vec::new();
        for (request, delay) in [(1u32, 30u64), (2, 10), (3, 20)] {
            let cache = cache.clone();
            let ticket = cache.ticket();
            tasks.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                cache.commit("balance", ticket, request);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.get(&"balance"), Some(3));
    }
}
