//! Content-addressed embedding cache (§4.3): process-local, keyed by a hash
//! of the exact input text, with a one-hour default TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use sha2::{Digest, Sha256};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

struct Entry {
    vector: Vec<f32>,
    expires_at: Instant,
}

/// A process-local map from `hash(text)` to embedding vector. Not shared
/// across processes; the RAG retriever and vector store each hold their
/// own instance wired in through `rag-core`'s embedding provider seam.
pub struct EmbeddingCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn key_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Returns the cached vector if present and not expired.
    #[must_use]
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = Self::key_for(text);
        let entries = self.entries.read();
        let entry = entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.vector.clone())
    }

    pub fn put(&self, text: &str, vector: Vec<f32>) {
        let key = Self::key_for(text);
        self.entries.write().insert(
            key,
            Entry {
                vector,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop expired entries; called by the L1-expiry housekeeper (§5.a).
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().retain(|_, e| e.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_returns_vector() {
        let cache = EmbeddingCache::new();
        cache.put("hello world", vec![1.0, 2.0, 3.0]);
        assert_eq!(cache.get("hello world"), Some(vec![1.0, 2.0, 3.0]));
    }

    #[test]
    fn miss_on_unknown_text() {
        let cache = EmbeddingCache::new();
        assert_eq!(cache.get("never stored"), None);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = EmbeddingCache::with_ttl(Duration::from_millis(1));
        cache.put("soon gone", vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("soon gone"), None);
    }

    #[test]
    fn purge_expired_removes_stale_rows() {
        let cache = EmbeddingCache::with_ttl(Duration::from_millis(1));
        cache.put("a", vec![1.0]);
        std::thread::sleep(Duration::from_millis(5));
        cache.purge_expired();
        assert!(cache.is_empty());
    }

    #[test]
    fn same_text_hashes_to_same_key() {
        assert_eq!(EmbeddingCache::key_for("abc"), EmbeddingCache::key_for("abc"));
        assert_ne!(EmbeddingCache::key_for("abc"), EmbeddingCache::key_for("abd"));
    }
}
