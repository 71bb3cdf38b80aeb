//! Cache-layer value types (§3 CacheEntry / CacheKeyResult, §4.9).

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use super::entities::ChunkRef;

/// Content type tag used by both the key generator and TTL derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Response,
    Embedding,
    Chunk,
    Summary,
    Analysis,
}

impl ContentType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ContentType::Response => "response",
            ContentType::Embedding => "embedding",
            ContentType::Chunk => "chunk",
            ContentType::Summary => "summary",
            ContentType::Analysis => "analysis",
        }
    }

    /// Base TTL in seconds before any adaptive/hot-path multiplier (§4.9).
    #[must_use]
    pub fn base_ttl_secs(self) -> u64 {
        match self {
            ContentType::Response => 900,
            ContentType::Embedding => 3600,
            ContentType::Chunk => 1800,
            ContentType::Summary => 1200,
            ContentType::Analysis => 1200,
        }
    }
}

/// Row-level-security classification of a cache entry (§3 invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheSecurityLevel {
    Public,
    Private,
    Encrypted,
}

/// Eviction/refresh priority, used by pre-warm and batched invalidation
/// ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Low,
    Normal,
    Critical,
}

/// The cached artifact itself: a finished answer plus its grounding and
/// accounting. This is what `CacheEntry.value` holds for `content_type =
/// Response`; embedding/chunk/summary entries carry their own payload
/// shape via `serde_json::Value` (kept loosely typed since the cache is
/// content-type polymorphic).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheEntryValue {
    pub answer: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub sources: Vec<ChunkRef>,
    pub confidence: Option<f32>,
    pub kind: String,
}

/// A stored row in L1/L2, matching the invariants of spec §3.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredEntry {
    pub key: String,
    pub value: CacheEntryValue,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
    pub dependencies: HashSet<String>,
    pub can_stale: bool,
    pub security_level: CacheSecurityLevel,
    /// Required when `security_level == Private`.
    pub user_id: Option<Uuid>,
    pub priority: CachePriority,
}

impl StoredEntry {
    /// Age since creation, in seconds.
    #[must_use]
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds().max(0)
    }

    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        (self.age_secs(now) as u64) <= self.ttl_secs
    }

    #[must_use]
    pub fn is_stale_but_within_grace(&self, now: DateTime<Utc>, grace_secs: u64) -> bool {
        let age = self.age_secs(now) as u64;
        self.can_stale && age > self.ttl_secs && age <= self.ttl_secs + grace_secs
    }

    /// RLS access gate (spec §3 invariant 1 / §4.9 "Access gating").
    #[must_use]
    pub fn readable_by(&self, requester: Option<Uuid>, enforce_rls: bool) -> bool {
        if !enforce_rls {
            return true;
        }
        match self.security_level {
            CacheSecurityLevel::Public => true,
            CacheSecurityLevel::Private => {
                requester.is_some() && requester == self.user_id
            }
            CacheSecurityLevel::Encrypted => requester.is_some(),
        }
    }
}

/// Output of the cache key generator (§4.2).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CacheKeyResult {
    pub primary_key: String,
    pub semantic_key: String,
    pub namespace: String,
    pub tags: Vec<String>,
    pub strategy_label: String,
    pub hot_path: bool,
    pub security_level: CacheSecurityLevel,
    pub ttl_hint_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: CacheSecurityLevel, user_id: Option<Uuid>) -> StoredEntry {
        StoredEntry {
            key: "k".into(),
            value: CacheEntryValue {
                answer: "a".into(),
                prompt_tokens: 1,
                completion_tokens: 1,
                sources: vec![],
                confidence: None,
                kind: "ask".into(),
            },
            created_at: Utc::now(),
            ttl_secs: 900,
            access_count: 0,
            last_access: Utc::now(),
            dependencies: HashSet::new(),
            can_stale: true,
            security_level: level,
            user_id,
            priority: CachePriority::Normal,
        }
    }

    #[test]
    fn public_readable_by_anyone() {
        let e = entry(CacheSecurityLevel::Public, None);
        assert!(e.readable_by(None, true));
        assert!(e.readable_by(Some(Uuid::new_v4()), true));
    }

    #[test]
    fn private_readable_only_by_owner() {
        let owner = Uuid::new_v4();
        let e = entry(CacheSecurityLevel::Private, Some(owner));
        assert!(!e.readable_by(None, true));
        assert!(!e.readable_by(Some(Uuid::new_v4()), true));
        assert!(e.readable_by(Some(owner), true));
    }

    #[test]
    fn encrypted_requires_any_authenticated_user() {
        let e = entry(CacheSecurityLevel::Encrypted, None);
        assert!(!e.readable_by(None, true));
        assert!(e.readable_by(Some(Uuid::new_v4()), true));
    }

    #[test]
    fn rls_disabled_allows_everyone() {
        let e = entry(CacheSecurityLevel::Private, Some(Uuid::new_v4()));
        assert!(e.readable_by(None, false));
    }
}
