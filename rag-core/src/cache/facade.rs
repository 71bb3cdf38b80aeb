//! Multi-Layer Cache (§4.9): the public façade over L1, an optional
//! pluggable L2, and a semantic lookup layer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::cache::key::matches_hot_pattern;
use crate::cache::l1::L1Cache;
use crate::cache::policy::{derive_ttl, BatchedInvalidationQueue, DependencyGraph, InvalidationStrategy};
use crate::config::CacheConfig;
use crate::embeddings::similarity::jaccard_word_overlap;
use crate::error::Result;
use crate::types::{CacheEntryValue, CachePriority, CacheSecurityLevel, ContentType, SecurityContext, StoredEntry};

/// The pluggable shared cache (L2). Implementations live outside this
/// crate (`rag-cache-redb` provides one).
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>>;
    async fn set(&self, entry: StoredEntry) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Options accepted by [`MultiLayerCache::set`].
#[derive(Debug, Clone)]
pub struct SetOptions {
    pub content_type: ContentType,
    pub dependencies: HashSet<String>,
    pub can_stale: bool,
    pub security_level: CacheSecurityLevel,
    pub user_id: Option<uuid::Uuid>,
    pub priority: CachePriority,
    pub access_count: u64,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            content_type: ContentType::Response,
            dependencies: HashSet::new(),
            can_stale: true,
            security_level: CacheSecurityLevel::Public,
            user_id: None,
            priority: CachePriority::Normal,
            access_count: 0,
        }
    }
}

/// Options accepted by [`MultiLayerCache::get`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    pub allow_stale: bool,
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub entry: StoredEntry,
    pub fresh: bool,
    pub stale: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub semantic_hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

struct Counters {
    l1_hits: u64,
    l2_hits: u64,
    semantic_hits: u64,
    misses: u64,
}

/// The multi-layer cache facade: `get`/`set`/`invalidate`/
/// `invalidateByPattern`/`preWarm`/`clear`/`stats` (§4.9).
pub struct MultiLayerCache {
    config: CacheConfig,
    l1: RwLock<L1Cache>,
    l2: Option<Arc<dyn SharedCache>>,
    dependencies: RwLock<DependencyGraph>,
    batch_queue: RwLock<BatchedInvalidationQueue>,
    counters: RwLock<Counters>,
}

impl MultiLayerCache {
    #[must_use]
    pub fn new(config: CacheConfig, l2: Option<Arc<dyn SharedCache>>) -> Self {
        let l1 = L1Cache::new(config.l1.strategy, config.l1.max_size_mb);
        let batch_queue = BatchedInvalidationQueue::new(&config);
        Self {
            l1: RwLock::new(l1),
            l2,
            dependencies: RwLock::new(DependencyGraph::new()),
            batch_queue: RwLock::new(batch_queue),
            config,
            counters: RwLock::new(Counters { l1_hits: 0, l2_hits: 0, semantic_hits: 0, misses: 0 }),
        }
    }

    pub async fn get(&self, key: &str, ctx: &SecurityContext, options: GetOptions, now: DateTime<Utc>) -> Result<Option<CacheHit>> {
        if let Some(entry) = self.l1.write().get(key, now) {
            if entry.readable_by(ctx.user_id, self.config.enforce_rls) {
                self.counters.write().l1_hits += 1;
                return Ok(Some(self.freshness(entry, options, now)));
            }
        }

        if let Some(l2) = &self.l2 {
            if self.config.l2.enabled {
                if let Some(entry) = l2.get(key).await? {
                    if entry.readable_by(ctx.user_id, self.config.enforce_rls) {
                        self.counters.write().l2_hits += 1;
                        if entry.is_fresh(now) && matches_hot_pattern(key) {
                            self.l1.write().put(entry.clone());
                        }
                        return Ok(Some(self.freshness(entry, options, now)));
                    }
                }
            }
        }

        self.counters.write().misses += 1;
        Ok(None)
    }

    fn freshness(&self, entry: StoredEntry, options: GetOptions, now: DateTime<Utc>) -> CacheHit {
        let fresh = entry.is_fresh(now);
        if fresh {
            return CacheHit { entry, fresh: true, stale: false };
        }
        let within_grace = entry.is_stale_but_within_grace(now, self.config.grace_period.as_secs());
        if options.allow_stale && entry.can_stale && within_grace {
            return CacheHit { entry, fresh: false, stale: true };
        }
        CacheHit { entry, fresh: false, stale: false }
    }

    /// Semantic lookup (§4.9): find a candidate sharing `semantic_key`
    /// whose primary key has Jaccard word-overlap with `primary_key`
    /// above the configured threshold.
    pub async fn get_semantic(
        &self,
        semantic_key: &str,
        primary_key: &str,
        candidates: &[StoredEntry],
        ctx: &SecurityContext,
    ) -> Option<StoredEntry> {
        if !self.config.semantic.enabled {
            return None;
        }
        let result = candidates
            .iter()
            .filter(|c| c.readable_by(ctx.user_id, self.config.enforce_rls))
            .map(|c| (c, jaccard_word_overlap(primary_key, &c.key)))
            .filter(|(_, score)| *score >= self.config.semantic.threshold)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(c, _)| c.clone());

        if result.is_some() {
            self.counters.write().semantic_hits += 1;
        }
        let _ = semantic_key;
        result
    }

    pub async fn set(&self, key: String, value: CacheEntryValue, options: SetOptions, now: DateTime<Utc>) -> Result<()> {
        let hot = matches_hot_pattern(&key) || options.access_count >= self.config.hot_path.promotion_access_count as u64;
        let decision = derive_ttl(options.content_type, options.access_count, hot, &self.config.hot_path);

        let entry = StoredEntry {
            key: key.clone(),
            value,
            created_at: now,
            ttl_secs: decision.ttl_secs,
            access_count: 0,
            last_access: now,
            dependencies: options.dependencies.clone(),
            can_stale: options.can_stale,
            security_level: options.security_level,
            user_id: options.user_id,
            priority: options.priority,
        };

        if self.config.l1.enabled {
            self.l1.write().put(entry.clone());
        }

        if let Some(l2) = &self.l2 {
            if hot || !self.config.l1.enabled {
                l2.set(entry.clone()).await?;
            }
        }

        self.dependencies.write().register(&key, &options.dependencies);
        Ok(())
    }

    /// Invalidate `keys` directly, then cascade through their dependents
    /// per `strategy`.
    pub async fn invalidate(&self, keys: &[String], strategy: InvalidationStrategy, now: DateTime<Utc>) -> Result<()> {
        match strategy {
            InvalidationStrategy::Immediate => {
                for key in keys {
                    self.invalidate_one(key).await?;
                }
            }
            InvalidationStrategy::Lazy => {
                // TTL expiry handles lazy invalidation; nothing to do eagerly.
            }
            InvalidationStrategy::Batched => {
                let mut queue = self.batch_queue.write();
                for key in keys {
                    queue.enqueue(key.clone(), now);
                }
            }
        }
        Ok(())
    }

    async fn invalidate_one(&self, key: &str) -> Result<()> {
        self.l1.write().remove(key);
        if let Some(l2) = &self.l2 {
            l2.remove(key).await?;
        }
        let cascaded = self.dependencies.read().cascade(key)?;
        self.dependencies.write().deregister(key);
        for dependent in cascaded {
            Box::pin(self.invalidate_one(&dependent)).await?;
        }
        Ok(())
    }

    /// Drain the batched invalidation queue if it's due (§5.a
    /// housekeeper).
    pub async fn drain_batched_invalidations(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.batch_queue.read().should_drain(now);
        if !due {
            return Ok(0);
        }
        let keys = self.batch_queue.write().drain();
        let count = keys.len();
        for key in &keys {
            self.invalidate_one(key).await?;
        }
        Ok(count)
    }

    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let mut count = 0;
        if let Some(l2) = &self.l2 {
            for key in l2.keys_matching(pattern).await? {
                self.invalidate_one(&key).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Sweep expired entries out of L1 (§5.a housekeeper). L2 entries
    /// expire lazily on read; L1 is bounded in memory so it's worth
    /// reclaiming eagerly.
    pub fn purge_expired_l1(&self, now: DateTime<Utc>) {
        self.l1.write().purge_expired(now);
    }

    /// Drop every L1 entry whose confidence is below `floor` (§8 scenario
    /// 6, driven by [`crate::budget::QualityRollback`]).
    pub fn purge_low_quality(&self, floor: f32) -> usize {
        self.l1.write().purge_low_quality(floor)
    }

    /// Insert pre-warmed entries with maximum TTL, marked hot-path.
    pub fn pre_warm(&self, entries: Vec<(String, CacheEntryValue)>, now: DateTime<Utc>) {
        let mut l1 = self.l1.write();
        for (key, value) in entries {
            l1.put(StoredEntry {
                key,
                value,
                created_at: now,
                ttl_secs: 3600,
                access_count: 0,
                last_access: now,
                dependencies: HashSet::new(),
                can_stale: true,
                security_level: CacheSecurityLevel::Public,
                user_id: None,
                priority: CachePriority::Critical,
            });
        }
    }

    pub fn clear(&self) {
        self.l1.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let counters = self.counters.read();
        CacheStats {
            l1_hits: counters.l1_hits,
            l2_hits: counters.l2_hits,
            semantic_hits: counters.semantic_hits,
            misses: counters.misses,
            evictions: self.l1.read().evictions(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_value() -> CacheEntryValue {
        CacheEntryValue { answer: "answer".into(), prompt_tokens: 1, completion_tokens: 1, sources: vec![], confidence: None, kind: "response".into() }
    }

    #[tokio::test]
    async fn set_then_get_returns_fresh_entry() {
        let cache = MultiLayerCache::new(CacheConfig::default(), None);
        let now = Utc::now();
        let ctx = SecurityContext::anonymous("127.0.0.1", "/chat");
        cache.set("k1".into(), entry_value(), SetOptions::default(), now).await.unwrap();
        let hit = cache.get("k1", &ctx, GetOptions::default(), now).await.unwrap();
        assert!(hit.unwrap().fresh);
    }

    #[tokio::test]
    async fn rls_blocks_other_users_private_entries() {
        let mut config = CacheConfig::default();
        config.l1.enabled = true;
        let cache = MultiLayerCache::new(config, None);
        let now = Utc::now();
        let owner = uuid::Uuid::new_v4();
        let stranger = SecurityContext::authenticated(uuid::Uuid::new_v4(), "127.0.0.1", "/chat");
        let options = SetOptions { security_level: CacheSecurityLevel::Private, user_id: Some(owner), ..Default::default() };
        cache.set("k1".into(), entry_value(), options, now).await.unwrap();
        let hit = cache.get("k1", &stranger, GetOptions::default(), now).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn disabling_enforce_rls_lets_anyone_read_private_entries() {
        let mut config = CacheConfig::default();
        config.l1.enabled = true;
        config.enforce_rls = false;
        let cache = MultiLayerCache::new(config, None);
        let now = Utc::now();
        let owner = uuid::Uuid::new_v4();
        let stranger = SecurityContext::authenticated(uuid::Uuid::new_v4(), "127.0.0.1", "/chat");
        let options = SetOptions { security_level: CacheSecurityLevel::Private, user_id: Some(owner), ..Default::default() };
        cache.set("k1".into(), entry_value(), options, now).await.unwrap();
        let hit = cache.get("k1", &stranger, GetOptions::default(), now).await.unwrap();
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn invalidate_removes_from_l1() {
        let cache = MultiLayerCache::new(CacheConfig::default(), None);
        let now = Utc::now();
        let ctx = SecurityContext::anonymous("127.0.0.1", "/chat");
        cache.set("k1".into(), entry_value(), SetOptions::default(), now).await.unwrap();
        cache.invalidate(&["k1".to_string()], InvalidationStrategy::Immediate, now).await.unwrap();
        let hit = cache.get("k1", &ctx, GetOptions::default(), now).await.unwrap();
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn cascade_invalidates_dependents() {
        let cache = MultiLayerCache::new(CacheConfig::default(), None);
        let now = Utc::now();
        let ctx = SecurityContext::anonymous("127.0.0.1", "/chat");
        let deps: HashSet<String> = ["book:1".to_string()].into_iter().collect();
        cache.set("response:a".into(), entry_value(), SetOptions { dependencies: deps, ..Default::default() }, now).await.unwrap();
        cache.invalidate(&["book:1".to_string()], InvalidationStrategy::Immediate, now).await.unwrap();
        let hit = cache.get("response:a", &ctx, GetOptions::default(), now).await.unwrap();
        assert!(hit.is_none());
    }
}
