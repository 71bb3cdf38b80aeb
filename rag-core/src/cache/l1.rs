//! L1 in-process cache (§4.9): an LRU- or LFU-evicted map bounded by a
//! byte budget rather than an entry count.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::config::EvictionStrategy;
use crate::types::StoredEntry;

/// Rough per-entry size estimate: value length plus a fixed struct
/// overhead, good enough for a byte budget rather than exact accounting.
fn estimate_bytes(entry: &StoredEntry) -> usize {
    64 + entry.key.len() + entry.value.answer.len()
}

enum Store {
    Lru(LruCache<String, StoredEntry>),
    Lfu {
        entries: HashMap<String, StoredEntry>,
        frequency: HashMap<String, u64>,
    },
}

/// The L1 cache. Eviction policy and the byte budget are fixed at
/// construction per [`crate::config::L1CacheConfig`].
pub struct L1Cache {
    store: Store,
    max_bytes: usize,
    used_bytes: usize,
    evictions: u64,
}

impl L1Cache {
    #[must_use]
    pub fn new(strategy: EvictionStrategy, max_size_mb: usize) -> Self {
        let store = match strategy {
            EvictionStrategy::Lru => Store::Lru(LruCache::new(NonZeroUsize::new(usize::MAX).expect("nonzero"))),
            EvictionStrategy::Lfu => Store::Lfu { entries: HashMap::new(), frequency: HashMap::new() },
        };
        Self { store, max_bytes: max_size_mb * 1024 * 1024, used_bytes: 0, evictions: 0 }
    }

    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Option<StoredEntry> {
        match &mut self.store {
            Store::Lru(cache) => {
                let entry = cache.get_mut(key)?;
                entry.access_count += 1;
                entry.last_access = now;
                Some(entry.clone())
            }
            Store::Lfu { entries, frequency } => {
                let entry = entries.get_mut(key)?;
                entry.access_count += 1;
                entry.last_access = now;
                *frequency.entry(key.to_string()).or_insert(0) += 1;
                Some(entry.clone())
            }
        }
    }

    pub fn put(&mut self, entry: StoredEntry) {
        let size = estimate_bytes(&entry);
        self.evict_until_fits(size);

        let key = entry.key.clone();
        self.used_bytes += size;
        match &mut self.store {
            Store::Lru(cache) => {
                if let Some(old) = cache.put(key, entry) {
                    self.used_bytes = self.used_bytes.saturating_sub(estimate_bytes(&old));
                }
            }
            Store::Lfu { entries, frequency } => {
                if let Some(old) = entries.insert(key.clone(), entry) {
                    self.used_bytes = self.used_bytes.saturating_sub(estimate_bytes(&old));
                }
                frequency.entry(key).or_insert(0);
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let removed = match &mut self.store {
            Store::Lru(cache) => cache.pop(key),
            Store::Lfu { entries, frequency } => {
                frequency.remove(key);
                entries.remove(key)
            }
        };
        if let Some(entry) = &removed {
            self.used_bytes = self.used_bytes.saturating_sub(estimate_bytes(entry));
        }
        removed
    }

    fn evict_until_fits(&mut self, incoming_size: usize) {
        while self.used_bytes + incoming_size > self.max_bytes {
            let victim = match &self.store {
                Store::Lru(cache) => cache.peek_lru().map(|(k, _)| k.clone()),
                Store::Lfu { frequency, .. } => {
                    frequency.iter().min_by_key(|(_, count)| **count).map(|(k, _)| k.clone())
                }
            };
            let Some(victim) = victim else { break };
            self.remove(&victim);
            self.evictions += 1;
        }
    }

    pub fn clear(&mut self) {
        match &mut self.store {
            Store::Lru(cache) => cache.clear(),
            Store::Lfu { entries, frequency } => {
                entries.clear();
                frequency.clear();
            }
        }
        self.used_bytes = 0;
    }

    pub fn len(&self) -> usize {
        match &self.store {
            Store::Lru(cache) => cache.len(),
            Store::Lfu { entries, .. } => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = match &self.store {
            Store::Lru(cache) => cache.iter().filter(|(_, e)| !e.is_fresh(now)).map(|(k, _)| k.clone()).collect(),
            Store::Lfu { entries, .. } => entries.iter().filter(|(_, e)| !e.is_fresh(now)).map(|(k, _)| k.clone()).collect(),
        };
        for key in expired {
            self.remove(&key);
        }
    }

    /// Drop every entry whose recorded confidence falls below `floor`
    /// (§8 scenario 6: a quality rollback purges low-confidence entries
    /// produced by the predictive/ML-assisted cache path). Entries with
    /// no confidence recorded are left alone, not treated as low quality.
    pub fn purge_low_quality(&mut self, floor: f32) -> usize {
        let victims: Vec<String> = match &self.store {
            Store::Lru(cache) => cache.iter().filter(|(_, e)| e.value.confidence.is_some_and(|c| c < floor)).map(|(k, _)| k.clone()).collect(),
            Store::Lfu { entries, .. } => entries.iter().filter(|(_, e)| e.value.confidence.is_some_and(|c| c < floor)).map(|(k, _)| k.clone()).collect(),
        };
        let count = victims.len();
        for key in victims {
            self.remove(&key);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CacheEntryValue, CachePriority, CacheSecurityLevel};
    use std::collections::HashSet;

    fn entry(key: &str, now: DateTime<Utc>) -> StoredEntry {
        StoredEntry {
            key: key.to_string(),
            value: CacheEntryValue {
                answer: "a".repeat(100),
                prompt_tokens: 10,
                completion_tokens: 10,
                sources: vec![],
                confidence: None,
                kind: "response".into(),
            },
            created_at: now,
            ttl_secs: 900,
            access_count: 0,
            last_access: now,
            dependencies: HashSet::new(),
            can_stale: true,
            security_level: CacheSecurityLevel::Public,
            user_id: None,
            priority: CachePriority::Normal,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let now = Utc::now();
        let mut cache = L1Cache::new(EvictionStrategy::Lru, 50);
        cache.put(entry("k1", now));
        assert!(cache.get("k1", now).is_some());
    }

    #[test]
    fn lru_evicts_least_recently_used_under_byte_pressure() {
        let now = Utc::now();
        let mut cache = L1Cache::new(EvictionStrategy::Lru, 0);
        cache.max_bytes = 300;
        cache.put(entry("k1", now));
        cache.put(entry("k2", now));
        cache.put(entry("k3", now));
        assert!(cache.evictions() > 0);
    }

    #[test]
    fn clear_resets_usage() {
        let now = Utc::now();
        let mut cache = L1Cache::new(EvictionStrategy::Lru, 50);
        cache.put(entry("k1", now));
        cache.clear();
        assert_eq!(cache.used_bytes(), 0);
        assert!(cache.is_empty());
    }
}
