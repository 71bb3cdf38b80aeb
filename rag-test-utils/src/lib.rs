//! In-memory fakes for every collaborator trait `rag-core` depends on
//! (`ChapterStore`, `EmbeddingProvider`, `CompletionProvider`,
//! `IdentityProvider`, `PersistenceAdapter`), so the rest of the workspace
//! can exercise the request path without a real database or model
//! provider.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use parking_lot::Mutex;
use uuid::Uuid;

use rag_core::persistence::{AuditEventRow, ChapterEmbeddingRow, PersistenceAdapter, RateLimitEntry};
use rag_core::providers::{ChapterStore, CompletionChunk, CompletionProvider, CompletionRequest, EmbeddingProvider, IdentityProvider};
use rag_core::types::{Book, Chapter, User};
use rag_core::{Error, Result};

/// Chapter store backed by an in-memory map, keyed by `(book_id, idx)`.
#[derive(Default)]
pub struct FakeChapterStore {
    chapters: Mutex<HashMap<Uuid, Vec<Chapter>>>,
}

impl FakeChapterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, book_id: Uuid, chapters: Vec<Chapter>) {
        self.chapters.lock().insert(book_id, chapters);
    }
}

#[async_trait]
impl ChapterStore for FakeChapterStore {
    async fn chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        Ok(self.chapters.lock().get(&book_id).cloned().unwrap_or_default())
    }

    async fn chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>> {
        Ok(self
            .chapters
            .lock()
            .get(&book_id)
            .and_then(|chapters| chapters.iter().find(|c| c.idx == idx).cloned()))
    }
}

/// Deterministic embedding provider: hashes each token into a fixed-size
/// vector so cosine similarity rewards literal word overlap, without
/// pulling in a real model.
pub struct FakeEmbeddingProvider {
    dimension: usize,
}

impl FakeEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for FakeEmbeddingProvider {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hash: u64 = 1469598103934665603;
            for byte in token.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(1099511628211);
            }
            let slot = (hash as usize) % self.dimension;
            vector[slot] += 1.0;
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "fake-hash-embedding"
    }
}

/// Completion provider that streams a fixed canned response, one word at
/// a time, and reports exact token usage on its final chunk.
pub struct FakeCompletionProvider {
    response: String,
}

impl FakeCompletionProvider {
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

impl Default for FakeCompletionProvider {
    fn default() -> Self {
        Self::new("This is a fake completion response for testing.")
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<futures::stream::BoxStream<'static, Result<CompletionChunk>>> {
        let words: Vec<String> = self.response.split_whitespace().map(ToString::to_string).collect();
        let prompt_tokens = (request.system_prompt.len() + request.user_prompt.len()).div_ceil(4) as u32;
        let completion_tokens = words.len() as u32;

        let mut chunks: Vec<Result<CompletionChunk>> =
            words.into_iter().map(|w| Ok(CompletionChunk::Token(format!("{w} ")))).collect();
        chunks.push(Ok(CompletionChunk::Usage { prompt_tokens: Some(prompt_tokens), completion_tokens: Some(completion_tokens) }));

        Ok(Box::pin(stream::iter(chunks)))
    }
}

/// Identity provider with a static bearer-token -> user-id table.
#[derive(Default)]
pub struct FakeIdentityProvider {
    tokens: Mutex<HashMap<String, Uuid>>,
}

impl FakeIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, bearer_token: impl Into<String>, user_id: Uuid) {
        self.tokens.lock().insert(bearer_token.into(), user_id);
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn resolve(&self, bearer_token: &str) -> Result<Uuid> {
        self.tokens.lock().get(bearer_token).copied().ok_or(Error::Unauthenticated)
    }
}

/// Full `PersistenceAdapter` fake, backed by in-memory vecs/maps behind a
/// single mutex. Not performant, but linearizable, which is all the
/// housekeeping and rate-limit logic needs for tests.
#[derive(Default)]
pub struct FakePersistence {
    users: Mutex<HashMap<Uuid, User>>,
    books: Mutex<HashMap<Uuid, Book>>,
    chapters: Mutex<HashMap<Uuid, Vec<Chapter>>>,
    embeddings: Mutex<HashMap<Uuid, Vec<ChapterEmbeddingRow>>>,
    rate_limits: Mutex<Vec<RateLimitEntry>>,
    audit_events: Mutex<Vec<AuditEventRow>>,
}

impl FakePersistence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: User) {
        self.users.lock().insert(user.id, user);
    }

    pub fn seed_book(&self, book: Book) {
        self.books.lock().insert(book.id, book);
    }

    pub fn seed_chapters(&self, book_id: Uuid, chapters: Vec<Chapter>) {
        self.chapters.lock().insert(book_id, chapters);
    }

    #[must_use]
    pub fn audit_events(&self) -> Vec<AuditEventRow> {
        self.audit_events.lock().clone()
    }
}

#[async_trait]
impl PersistenceAdapter for FakePersistence {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.lock().values().find(|u| u.email == email).cloned())
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        Ok(self.books.lock().get(&id).cloned())
    }

    async fn get_chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>> {
        Ok(self.chapters.lock().get(&book_id).and_then(|c| c.iter().find(|c| c.idx == idx).cloned()))
    }

    async fn get_chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        Ok(self.chapters.lock().get(&book_id).cloned().unwrap_or_default())
    }

    async fn get_chapter_embeddings(&self, book_id: Uuid) -> Result<Vec<ChapterEmbeddingRow>> {
        Ok(self.embeddings.lock().get(&book_id).cloned().unwrap_or_default())
    }

    async fn insert_chapter_embedding(&self, row: ChapterEmbeddingRow) -> Result<()> {
        self.embeddings.lock().entry(row.book_id).or_default().push(row);
        Ok(())
    }

    async fn purge_rate_limit_entries_for_key(&self, key: &str, since: DateTime<Utc>) -> Result<()> {
        self.rate_limits.lock().retain(|e| e.key != key || e.timestamp >= since);
        Ok(())
    }

    async fn count_rate_limit_entries(&self, key: &str) -> Result<u32> {
        Ok(self.rate_limits.lock().iter().filter(|e| e.key == key).count() as u32)
    }

    async fn insert_rate_limit_entry(&self, entry: RateLimitEntry) -> Result<()> {
        self.rate_limits.lock().push(entry);
        Ok(())
    }

    async fn purge_all_rate_limit_entries(&self, since: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.rate_limits.lock();
        let before = guard.len();
        guard.retain(|e| e.timestamp >= since);
        Ok((before - guard.len()) as u64)
    }

    async fn insert_audit_event(&self, event: AuditEventRow) -> Result<()> {
        self.audit_events.lock().push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_embedding_provider_is_deterministic() {
        let provider = FakeEmbeddingProvider::default();
        let a = provider.embed_text("the quick brown fox").await.unwrap();
        let b = provider.embed_text("the quick brown fox").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn fake_identity_provider_rejects_unknown_tokens() {
        let idp = FakeIdentityProvider::new();
        let err = idp.resolve("no-such-token").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn fake_persistence_round_trips_rate_limit_entries() {
        let persistence = FakePersistence::new();
        persistence
            .insert_rate_limit_entry(RateLimitEntry {
                key: "ip:1.2.3.4".into(),
                timestamp: Utc::now(),
                ip: "1.2.3.4".into(),
                user_agent: "test".into(),
                endpoint: "/ask".into(),
            })
            .await
            .unwrap();
        assert_eq!(persistence.count_rate_limit_entries("ip:1.2.3.4").await.unwrap(), 1);
    }
}
