//! Results of reads pinned to an explicit block height.
//!
//! Such results never change unless the block itself is reorganized away, so
//! entries are immutable; [`ReadCache::invalidate_from`] is the only way to
//! remove them besides least-recently-used eviction.

use std::num::NonZeroUsize;

use alloy_primitives::{Address, Bytes, B256};
use lru::LruCache;
use parking_lot::Mutex;

type Key = (B256, u64);

/// Bounded map from `(descriptor digest, height)` to raw return data.
///
/// A capacity of zero disables caching.
#[derive(Debug)]
pub struct ReadCache {
    entries: Option<Mutex<LruCache<Key, (Address, Bytes)>>>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    pub fn get(&self, digest: B256, height: u64) -> Option<Bytes> {
        self.entries
            .as_ref()?
            .lock()
            .get(&(digest, height))
            .map(|(_, value)| value.clone())
    }

    /// Stores a result. An existing entry for the key is left untouched.
    pub fn insert(&self, digest: B256, height: u64, target: Address, value: Bytes) {
        let Some(entries) = &self.entries else {
            return;
        };
        let mut entries = entries.lock();
        let key = (digest, height);
        if entries.contains(&key) {
            return;
        }
        entries.put(key, (target, value));
    }

    /// Drops entries for `target` at heights `>= height`, returning how many
    /// were removed.
    pub fn invalidate_from(&self, target: Address, height: u64) -> usize {
        let Some(entries) = &self.entries else {
            return 0;
        };
        let mut entries = entries.lock();
        let stale: Vec<Key> = entries
            .iter()
            .filter(|((_, h), (address, _))| *address == target && *h >= height)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.as_ref().map_or(0, |entries| entries.lock().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
