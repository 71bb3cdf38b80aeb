//! Cache Policy Engine (§4.9): TTL derivation, staleness windows,
//! dependency-cascade invalidation and RLS access gating.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{CacheConfig, HotPathConfig};
use crate::error::{Error, Result};
use crate::types::ContentType;

const MIN_TTL_SECS: u64 = 60;
const MAX_TTL_SECS: u64 = 3600;

/// How a given `invalidate` call should be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationStrategy {
    Immediate,
    Lazy,
    Batched,
}

/// Derive TTL, `staleAfter` and `refreshAfter` for a content type, access
/// count, and hot-path flag (§4.9 "TTL derivation").
#[must_use]
pub fn derive_ttl(content_type: ContentType, access_count: u64, hot_path: bool, hot_path_config: &HotPathConfig) -> TtlDecision {
    let base = content_type.base_ttl_secs().clamp(MIN_TTL_SECS, MAX_TTL_SECS);

    let adaptive_multiplier = 1.0 + (access_count as f32 / 10.0).min(0.5);
    let mut ttl = (base as f32 * adaptive_multiplier) as u64;

    if hot_path {
        ttl *= u64::from(hot_path_config.ttl_multiplier);
    }
    ttl = ttl.clamp(MIN_TTL_SECS, MAX_TTL_SECS * u64::from(hot_path_config.ttl_multiplier.max(1)));

    TtlDecision {
        ttl_secs: ttl,
        stale_after_secs: (ttl as f32 * 0.8) as u64,
        refresh_after_secs: (ttl as f32 * 0.9) as u64,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlDecision {
    pub ttl_secs: u64,
    pub stale_after_secs: u64,
    pub refresh_after_secs: u64,
}

/// Tracks `key -> dep` and the reverse `dep -> {keys}` adjacency used by
/// cascade invalidation.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    key_to_deps: HashMap<String, HashSet<String>>,
    dep_to_keys: HashMap<String, HashSet<String>>,
}

impl DependencyGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: &str, deps: &HashSet<String>) {
        for dep in deps {
            self.dep_to_keys.entry(dep.clone()).or_default().insert(key.to_string());
        }
        self.key_to_deps.insert(key.to_string(), deps.clone());
    }

    pub fn deregister(&mut self, key: &str) {
        if let Some(deps) = self.key_to_deps.remove(key) {
            for dep in deps {
                if let Some(keys) = self.dep_to_keys.get_mut(&dep) {
                    keys.remove(key);
                }
            }
        }
    }

    /// Keys transitively dependent on `key`, following `key -> dependents
    /// -> their dependents -> ...` via the reverse adjacency. `key` is
    /// itself treated as a dependency identifier (e.g. `book:<id>`), so
    /// both a raw dependency tag and a cache key that other entries
    /// depend on work as the starting point. Returns `Err(CascadeCycle)`
    /// if the transitive walk revisits a key, instead of looping forever.
    pub fn cascade(&self, key: &str) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut frontier = vec![key.to_string()];
        visited.insert(key.to_string());

        while let Some(current) = frontier.pop() {
            let Some(dependents) = self.dep_to_keys.get(&current) else { continue };
            for dependent in dependents {
                if dependent == &current {
                    continue;
                }
                if !visited.insert(dependent.clone()) {
                    return Err(Error::CascadeCycle(dependent.clone()));
                }
                result.push(dependent.clone());
                frontier.push(dependent.clone());
            }
        }

        Ok(result)
    }
}

/// Queues keys for `batched` invalidation, draining by size or debounce
/// timer.
pub struct BatchedInvalidationQueue {
    pending: Vec<String>,
    batch_size: usize,
    debounce: Duration,
    last_enqueued_at: Option<DateTime<Utc>>,
}

impl BatchedInvalidationQueue {
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pending: Vec::new(),
            batch_size: config.batched_invalidation_size,
            debounce: config.batched_invalidation_debounce,
            last_enqueued_at: None,
        }
    }

    pub fn enqueue(&mut self, key: String, now: DateTime<Utc>) {
        self.pending.push(key);
        self.last_enqueued_at = Some(now);
    }

    /// `true` when the queue should be drained: it has reached the size
    /// threshold, or the debounce window has elapsed since the last
    /// enqueue.
    #[must_use]
    pub fn should_drain(&self, now: DateTime<Utc>) -> bool {
        if self.pending.len() >= self.batch_size {
            return true;
        }
        match self.last_enqueued_at {
            Some(last) => {
                let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
                !self.pending.is_empty() && elapsed >= self.debounce
            }
            None => false,
        }
    }

    pub fn drain(&mut self) -> Vec<String> {
        self.last_enqueued_at = None;
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_clamped_to_configured_range() {
        let hot_path = HotPathConfig { ttl_multiplier: 2, ..Default::default() };
        let decision = derive_ttl(ContentType::Response, 0, false, &hot_path);
        assert!(decision.ttl_secs >= MIN_TTL_SECS);
    }

    #[test]
    fn hot_path_multiplies_ttl() {
        let hot_path = HotPathConfig { ttl_multiplier: 2, ..Default::default() };
        let cold = derive_ttl(ContentType::Response, 0, false, &hot_path);
        let hot = derive_ttl(ContentType::Response, 0, true, &hot_path);
        assert!(hot.ttl_secs >= cold.ttl_secs * 2 - 1);
    }

    #[test]
    fn stale_and_refresh_after_are_fractions_of_ttl() {
        let hot_path = HotPathConfig::default();
        let decision = derive_ttl(ContentType::Embedding, 0, false, &hot_path);
        assert!(decision.stale_after_secs < decision.ttl_secs);
        assert!(decision.refresh_after_secs > decision.stale_after_secs);
    }

    #[test]
    fn cascade_invalidates_transitive_dependents() {
        let mut graph = DependencyGraph::new();
        let dep_a: HashSet<String> = ["book:1".to_string()].into_iter().collect();
        let dep_b: HashSet<String> = ["response:a".to_string()].into_iter().collect();
        graph.register("response:a", &dep_a);
        graph.register("response:b", &dep_b);

        let cascaded = graph.cascade("book:1").unwrap();
        assert!(cascaded.contains(&"response:a".to_string()));
    }

    #[test]
    fn batched_queue_drains_at_size_threshold() {
        let config = CacheConfig { batched_invalidation_size: 2, ..Default::default() };
        let mut queue = BatchedInvalidationQueue::new(&config);
        let now = Utc::now();
        queue.enqueue("a".into(), now);
        assert!(!queue.should_drain(now));
        queue.enqueue("b".into(), now);
        assert!(queue.should_drain(now));
    }
}
