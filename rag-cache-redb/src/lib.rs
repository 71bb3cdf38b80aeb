//! redb-backed L2 [`rag_core::cache::SharedCache`]: a single-file embedded
//! key/value store holding serialized `StoredEntry` rows, so cache state
//! survives process restarts and can be shared between server instances
//! mounting the same file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rag_core::cache::SharedCache;
use rag_core::error::{Error, Result};
use rag_core::types::StoredEntry;
use redb::{Database, ReadableTable, TableDefinition};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cache_entries");

/// Thin wrapper around a `redb::Database`. `redb` transactions are
/// synchronous; every method here wraps its body in `tokio::task::spawn_blocking`
/// so callers on the async request path never block the runtime.
pub struct RedbCache {
    db: Arc<Mutex<Database>>,
}

impl RedbCache {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = Database::create(path).map_err(|e| Error::Dependency(format!("failed to open redb cache: {e}")))?;
        {
            let write = db.begin_write().map_err(|e| Error::Dependency(format!("redb begin_write: {e}")))?;
            write.open_table(TABLE).map_err(|e| Error::Dependency(format!("redb open_table: {e}")))?;
            write.commit().map_err(|e| Error::Dependency(format!("redb commit: {e}")))?;
        }
        Ok(Self { db: Arc::new(Mutex::new(db)) })
    }

    /// In-process temp-file backed instance, for tests.
    pub fn temp() -> Result<Self> {
        let file = tempfile::NamedTempFile::new().map_err(|e| Error::Dependency(format!("tempfile: {e}")))?;
        Self::open(file.path())
    }
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        key.starts_with(prefix)
    } else {
        key == pattern
    }
}

#[async_trait]
impl SharedCache for RedbCache {
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let db = db.lock();
            let read = db.begin_read().map_err(|e| Error::Dependency(format!("redb begin_read: {e}")))?;
            let table = read.open_table(TABLE).map_err(|e| Error::Dependency(format!("redb open_table: {e}")))?;
            match table.get(key.as_str()).map_err(|e| Error::Dependency(format!("redb get: {e}")))? {
                Some(value) => {
                    let entry: StoredEntry = serde_json::from_slice(value.value()).map_err(Error::Serialization)?;
                    Ok(Some(entry))
                }
                None => Ok(None),
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("redb task join: {e}")))?
    }

    async fn set(&self, entry: StoredEntry) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let bytes = serde_json::to_vec(&entry).map_err(Error::Serialization)?;
            let db = db.lock();
            let write = db.begin_write().map_err(|e| Error::Dependency(format!("redb begin_write: {e}")))?;
            {
                let mut table = write.open_table(TABLE).map_err(|e| Error::Dependency(format!("redb open_table: {e}")))?;
                table.insert(entry.key.as_str(), bytes.as_slice()).map_err(|e| Error::Dependency(format!("redb insert: {e}")))?;
            }
            write.commit().map_err(|e| Error::Dependency(format!("redb commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("redb task join: {e}")))?
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let db = self.db.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let db = db.lock();
            let write = db.begin_write().map_err(|e| Error::Dependency(format!("redb begin_write: {e}")))?;
            {
                let mut table = write.open_table(TABLE).map_err(|e| Error::Dependency(format!("redb open_table: {e}")))?;
                table.remove(key.as_str()).map_err(|e| Error::Dependency(format!("redb remove: {e}")))?;
            }
            write.commit().map_err(|e| Error::Dependency(format!("redb commit: {e}")))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Internal(format!("redb task join: {e}")))?
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let db = self.db.clone();
        let pattern = pattern.to_string();
        tokio::task::spawn_blocking(move || {
            let db = db.lock();
            let read = db.begin_read().map_err(|e| Error::Dependency(format!("redb begin_read: {e}")))?;
            let table = read.open_table(TABLE).map_err(|e| Error::Dependency(format!("redb open_table: {e}")))?;
            let mut out = Vec::new();
            for item in table.iter().map_err(|e| Error::Dependency(format!("redb iter: {e}")))? {
                let (key, _) = item.map_err(|e| Error::Dependency(format!("redb iter item: {e}")))?;
                let key = key.value().to_string();
                if matches_pattern(&key, &pattern) {
                    out.push(key);
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Internal(format!("redb task join: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rag_core::types::{CacheEntryValue, CachePriority, CacheSecurityLevel};
    use std::collections::HashSet;

    fn entry(key: &str) -> StoredEntry {
        StoredEntry {
            key: key.to_string(),
            value: CacheEntryValue { answer: "a".into(), prompt_tokens: 1, completion_tokens: 1, sources: vec![], confidence: None, kind: "ask".into() },
            created_at: Utc::now(),
            ttl_secs: 900,
            access_count: 0,
            last_access: Utc::now(),
            dependencies: HashSet::new(),
            can_stale: true,
            security_level: CacheSecurityLevel::Public,
            user_id: None,
            priority: CachePriority::Normal,
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = RedbCache::temp().unwrap();
        cache.set(entry("response:book:1:ch:0")).await.unwrap();
        let fetched = cache.get("response:book:1:ch:0").await.unwrap();
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().key, "response:book:1:ch:0");
    }

    #[tokio::test]
    async fn remove_deletes_entry() {
        let cache = RedbCache::temp().unwrap();
        cache.set(entry("response:book:1:ch:0")).await.unwrap();
        cache.remove("response:book:1:ch:0").await.unwrap();
        assert!(cache.get("response:book:1:ch:0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_matching_prefix_pattern() {
        let cache = RedbCache::temp().unwrap();
        cache.set(entry("response:book:1:ch:0")).await.unwrap();
        cache.set(entry("response:book:1:ch:1")).await.unwrap();
        cache.set(entry("response:book:2:ch:0")).await.unwrap();
        let matched = cache.keys_matching("response:book:1:*").await.unwrap();
        assert_eq!(matched.len(), 2);
    }
}
