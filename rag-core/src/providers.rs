//! External collaborator traits (§1): the five seams the core depends on
//! and nothing else. Implementations live outside this crate (or in
//! `rag-test-utils` for fakes); the core is generic over them via `Arc<dyn
//! Trait>`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::error::Result;
use crate::types::Chapter;

/// Returns ordered chapter text for a book. Book ingestion itself is out of
/// scope (§1); this is the read-only seam the retrieval pipeline consumes.
#[async_trait]
pub trait ChapterStore: Send + Sync {
    async fn chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>>;
    async fn chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>>;
}

/// Maps text to a fixed-dimensional vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts. Default calls `embed_text` per item;
    /// providers with a native batch API should override.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_text(text).await?);
        }
        Ok(out)
    }

    /// Dimension `D` every vector this provider returns will have.
    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone)]
pub enum CompletionChunk {
    /// A fragment of generated text.
    Token(String),
    /// Terminal chunk carrying provider-reported usage, when available.
    Usage {
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
}

/// A request to the completion provider (§4.7).
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub max_response_tokens: u32,
    pub temperature: f32,
}

/// Produces a streamed textual response from a prompt. Streaming is
/// modeled as a `BoxStream` of chunks so the completer can consume tokens
/// as they arrive and apply early stopping (§4.7) or cancellation (§5)
/// without buffering the whole answer.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<CompletionChunk>>>;
}

/// Resolves an opaque bearer credential to a stable user identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, bearer_token: &str) -> Result<Uuid>;
}
