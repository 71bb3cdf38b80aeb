//! The `PersistenceAdapter` trait: the single interface the core depends on
//! for durable rows (§6). Table shapes are described by invariant, not by
//! schema — `rag-storage-sql` provides the libSQL-backed implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Book, Chapter, User};

/// A `(book_id, chapter_idx)` embedding row as persisted by
/// `chapter_embeddings` (§6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChapterEmbeddingRow {
    pub id: Uuid,
    pub book_id: Uuid,
    pub chapter_idx: u32,
    pub start: usize,
    pub end: usize,
    pub vector: Vec<f32>,
    pub content: String,
}

/// An append-only `rate_limit_entries` row (§6, §4.11).
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    pub endpoint: String,
}

/// Severity of an audit event, mirrored onto the wire as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// An append-only `audit_events` row (§6).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditEventRow {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub user_id: Option<Uuid>,
    pub ip: String,
    pub endpoint: String,
    pub details: serde_json::Value,
    pub severity: AuditSeverity,
}

/// Durable storage the request-fulfillment core depends on. Every method
/// is a point read/write over a single logical table; the core never
/// retains a cursor or transaction across an await point outside this
/// trait's own methods.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>>;

    async fn get_chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>>;
    async fn get_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>>;

    async fn get_chapter_embeddings(&self, book_id: Uuid) -> Result<Vec<ChapterEmbeddingRow>>;
    async fn insert_chapter_embedding(&self, row: ChapterEmbeddingRow) -> Result<()>;

    /// Delete rows for `key` older than `since` (§4.11 step 1).
    async fn purge_rate_limit_entries_for_key(&self, key: &str, since: DateTime<Utc>) -> Result<()>;

    /// Count remaining rows for `key` (§4.11 step 2).
    async fn count_rate_limit_entries(&self, key: &str) -> Result<u32>;

    /// Insert a new row, admitting the request (§4.11 step 4).
    async fn insert_rate_limit_entry(&self, entry: RateLimitEntry) -> Result<()>;

    /// Purge all rows older than `since`, across every key, for the
    /// once-a-minute housekeeper (§5.a).
    async fn purge_all_rate_limit_entries(&self, since: DateTime<Utc>) -> Result<u64>;

    async fn insert_audit_event(&self, event: AuditEventRow) -> Result<()>;
}
