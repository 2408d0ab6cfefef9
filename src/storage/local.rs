//! Local shard store.
//!
//! The only state a node keeps: for each key, this node's shard of the
//! record and how many times the key has been written here.

use bytes::Bytes;
use dashmap::DashMap;
use tracing::trace;

/// A node's shard for one key plus its local write counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    pub shard: Bytes,
    pub modification_count: u64,
}

/// Concurrent key -> [`LocalEntry`] table. Last write wins; no eviction.
#[derive(Debug, Default)]
pub struct LocalShardStore {
    entries: DashMap<String, LocalEntry>,
}

impl LocalShardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the shard for `key` and bump its counter, returning the new
    /// count. Both happen under the entry's shard lock, so concurrent puts
    /// to one key never lose an increment.
    pub fn put(&self, key: &str, shard: Bytes) -> u64 {
        let entry = self
            .entries
            .entry(key.to_string())
            .and_modify(|e| {
                e.shard = shard.clone();
                e.modification_count += 1;
            })
            .or_insert_with(|| LocalEntry {
                shard,
                modification_count: 1,
            });
        let count = entry.modification_count;
        trace!(key, count, "Stored local shard");
        count
    }

    /// This node's shard for `key`
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.get(key).map(|e| e.shard.clone())
    }

    /// Shard and counter together, read atomically
    pub fn entry(&self, key: &str) -> Option<LocalEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Local write counter for `key`, 0 if never written
    pub fn modification_count(&self, key: &str) -> u64 {
        self.entries
            .get(key)
            .map_or(0, |e| e.modification_count)
    }

    /// Number of keys held
    pub fn count(&self) -> usize {
        self.entries.len()
    }
}
