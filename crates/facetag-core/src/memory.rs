//! Identity memory: a bounded session cache of assigned labels.
//!
//! Keys combine a face fingerprint with a coarse position bucket. Eviction is
//! by insertion order, not by access recency: once the entry count exceeds
//! `max_entries`, everything but the `retain_entries` most recently inserted
//! keys is dropped in one pass. Lookups never refresh an entry.

use crate::fingerprint::Fingerprint;
use crate::types::PositionBucket;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_RETAIN_ENTRIES: usize = 100;

/// Fingerprint plus position bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryKey(String);

impl MemoryKey {
    pub fn new(fingerprint: &Fingerprint, bucket: &PositionBucket) -> Self {
        Self(format!("{fingerprint}_{bucket}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemoryKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryConfig {
    pub max_entries: usize,
    pub retain_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            retain_entries: DEFAULT_RETAIN_ENTRIES,
        }
    }
}

impl MemoryConfig {
    /// Clamp so that `retain_entries <= max_entries` and the bound is at least one.
    pub fn new(max_entries: usize, retain_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        Self {
            max_entries,
            retain_entries: retain_entries.min(max_entries),
        }
    }
}

#[derive(Default)]
struct Entries {
    labels: HashMap<MemoryKey, String>,
    /// Keys in first-insertion order.
    order: VecDeque<MemoryKey>,
}

/// Shared, bounded MemoryKey → label cache.
///
/// All operations take one lock, so the eviction rewrite can never interleave
/// with a concurrent lookup or insert.
pub struct IdentityMemory {
    config: MemoryConfig,
    entries: Mutex<Entries>,
}

impl Default for IdentityMemory {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl IdentityMemory {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            config: MemoryConfig::new(config.max_entries, config.retain_entries),
            entries: Mutex::new(Entries::default()),
        }
    }

    pub fn lookup(&self, key: &MemoryKey) -> Option<String> {
        self.entries.lock().labels.get(key).cloned()
    }

    /// Store `label` under `key`. An existing key keeps its original
    /// insertion position.
    pub fn insert(&self, key: MemoryKey, label: impl Into<String>) {
        let mut entries = self.entries.lock();
        let label = label.into();

        if let Some(existing) = entries.labels.get_mut(&key) {
            *existing = label;
            return;
        }

        entries.order.push_back(key.clone());
        entries.labels.insert(key, label);

        if entries.order.len() > self.config.max_entries {
            let before = entries.order.len();
            while entries.order.len() > self.config.retain_entries {
                if let Some(old) = entries.order.pop_front() {
                    entries.labels.remove(&old);
                }
            }
            tracing::debug!(
                before,
                after = entries.order.len(),
                "identity memory evicted oldest entries"
            );
        }
    }

    /// Drop every entry, returning how many were cleared.
    pub fn reset(&self) -> usize {
        let mut entries = self.entries.lock();
        let cleared = entries.order.len();
        entries.labels.clear();
        entries.order.clear();
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.config.max_entries
    }

    pub fn config(&self) -> MemoryConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(i: usize) -> MemoryKey {
        MemoryKey::from(format!("k{i}").as_str())
    }

    #[test]
    fn test_insert_then_lookup() {
        let memory = IdentityMemory::default();
        memory.insert(key(1), "ana");
        assert_eq!(memory.lookup(&key(1)).as_deref(), Some("ana"));
        assert_eq!(memory.lookup(&key(2)), None);
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn test_many_keys_one_label() {
        let memory = IdentityMemory::default();
        memory.insert(key(1), "ana");
        memory.insert(key(2), "ana");
        assert_eq!(memory.lookup(&key(1)), memory.lookup(&key(2)));
    }

    #[test]
    fn test_eviction_keeps_last_hundred_of_1001() {
        let memory = IdentityMemory::default();
        for i in 0..1001 {
            memory.insert(key(i), format!("id{i}"));
        }
        assert_eq!(memory.len(), 100);
        for i in 0..901 {
            assert_eq!(memory.lookup(&key(i)), None, "key {i} should be evicted");
        }
        for i in 901..1001 {
            assert_eq!(memory.lookup(&key(i)), Some(format!("id{i}")));
        }
    }

    #[test]
    fn test_no_eviction_at_bound() {
        let memory = IdentityMemory::default();
        for i in 0..1000 {
            memory.insert(key(i), "x");
        }
        assert_eq!(memory.len(), 1000);
        assert!(memory.lookup(&key(0)).is_some());
    }

    #[test]
    fn test_eviction_ignores_access_recency() {
        let memory = IdentityMemory::new(MemoryConfig::new(4, 2));
        for i in 0..4 {
            memory.insert(key(i), "x");
        }
        // Touching the oldest key does not protect it.
        assert!(memory.lookup(&key(0)).is_some());
        memory.insert(key(4), "x");
        assert_eq!(memory.lookup(&key(0)), None);
        assert_eq!(memory.lookup(&key(2)), None);
        assert!(memory.lookup(&key(3)).is_some());
        assert!(memory.lookup(&key(4)).is_some());
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let memory = IdentityMemory::new(MemoryConfig::new(3, 1));
        memory.insert(key(0), "a");
        memory.insert(key(1), "b");
        memory.insert(key(2), "c");
        memory.insert(key(0), "z");
        assert_eq!(memory.len(), 3);
        assert_eq!(memory.lookup(&key(0)).as_deref(), Some("z"));

        memory.insert(key(3), "d");
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.lookup(&key(0)), None);
        assert_eq!(memory.lookup(&key(3)).as_deref(), Some("d"));
    }

    #[test]
    fn test_reset_clears() {
        let memory = IdentityMemory::default();
        memory.insert(key(1), "ana");
        memory.insert(key(2), "luis");
        assert_eq!(memory.reset(), 2);
        assert_eq!(memory.lookup(&key(1)), None);
        assert!(memory.is_empty());
    }

    #[test]
    fn test_config_clamps_retain() {
        let config = MemoryConfig::new(10, 50);
        assert_eq!(config.retain_entries, 10);
        assert_eq!(MemoryConfig::new(0, 0).max_entries, 1);
    }

    #[test]
    fn test_concurrent_inserts_respect_bound() {
        let memory = Arc::new(IdentityMemory::new(MemoryConfig::new(50, 10)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let memory = Arc::clone(&memory);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        memory.insert(key(t * 1000 + i), "x");
                        assert!(memory.len() <= 50);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(memory.len() <= 50);
    }
}
