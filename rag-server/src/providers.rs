//! Concrete implementations of the five external collaborator traits
//! (§1) the core binary needs to actually run: chapters backed by the
//! same SQL rows as everything else, and embeddings/completions backed
//! by an OpenAI-compatible HTTP API. None of this is load-bearing for
//! the request-fulfillment pipeline itself — a deployer is free to
//! swap any of these for their own implementation of the trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use futures::stream::{self, BoxStream, StreamExt};
use rag_core::error::{Error, Result};
use rag_core::persistence::PersistenceAdapter;
use rag_core::providers::{ChapterStore, CompletionChunk, CompletionProvider, CompletionRequest, EmbeddingProvider, IdentityProvider};
use rag_core::types::Chapter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// [`ChapterStore`] backed by the same persistence adapter used for
/// everything else; chapter ingestion itself stays out of scope (§1),
/// this just reads the rows back out.
pub struct SqlChapterStore {
    persistence: Arc<dyn PersistenceAdapter>,
}

impl SqlChapterStore {
    #[must_use]
    pub fn new(persistence: Arc<dyn PersistenceAdapter>) -> Self {
        Self { persistence }
    }
}

#[async_trait]
impl ChapterStore for SqlChapterStore {
    async fn chapters(&self, book_id: Uuid) -> Result<Vec<Chapter>> {
        self.persistence.get_chapters(book_id).await
    }

    async fn chapter(&self, book_id: Uuid, idx: u32) -> Result<Option<Chapter>> {
        self.persistence.get_chapter(book_id, idx).await
    }
}

/// Resolves a bearer token to a user id by reading the unverified `sub`
/// claim out of a JWT payload. Signature verification is assumed to
/// have already happened upstream (an API gateway, a reverse proxy);
/// production deployments should additionally verify against JWKS.
pub struct JwtIdentityProvider;

impl JwtIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for JwtIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct JwtClaims {
    sub: Uuid,
}

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn resolve(&self, bearer_token: &str) -> Result<Uuid> {
        let mut parts = bearer_token.split('.');
        let (Some(_header), Some(payload), Some(_signature)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(Error::Unauthenticated);
        };
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| Error::Unauthenticated)?;
        let claims: JwtClaims = serde_json::from_slice(&decoded).map_err(|_| Error::Unauthenticated)?;
        Ok(claims.sub)
    }
}

/// Config for the HTTP-backed embedding/completion providers (§1).
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub completion_model: String,
    pub request_timeout: Duration,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            completion_model: "gpt-4o-mini".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build http client: {e}")))
}

#[derive(Serialize)]
struct EmbeddingRequestBody<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponseBody {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Embeds text via an OpenAI-compatible `/embeddings` endpoint (§1).
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&EmbeddingRequestBody { input: text, model: &self.config.embedding_model })
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dependency(format!("embedding provider returned {status}: {body}")));
        }

        let parsed: EmbeddingResponseBody = response.json().await.map_err(|e| Error::Dependency(format!("malformed embedding response: {e}")))?;
        parsed.data.into_iter().next().map(|d| d.embedding).ok_or_else(|| Error::Dependency("embedding provider returned no data".to_string()))
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embedding_model
    }
}

#[derive(Serialize)]
struct ChatCompletionRequestBody<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamUsage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

/// Streams a chat completion via an OpenAI-compatible server-sent-events
/// `/chat/completions` endpoint (§4.7).
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpCompletionProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<CompletionChunk>>> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatCompletionRequestBody {
            model: &self.config.completion_model,
            messages: [ChatMessage { role: "system", content: &request.system_prompt }, ChatMessage { role: "user", content: &request.user_prompt }],
            max_tokens: request.max_response_tokens,
            temperature: request.temperature,
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("completion request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Dependency(format!("completion provider returned {status}: {text}")));
        }

        let byte_stream = response.bytes_stream().boxed();
        let lines = stream::unfold((byte_stream, Vec::<u8>::new()), |(mut bytes, mut buf)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line = buf.drain(..=pos).collect::<Vec<u8>>();
                    let line = String::from_utf8_lossy(&line).trim().to_string();
                    return Some((line, (bytes, buf)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((format!("__error__:{e}"), (bytes, buf))),
                    None if buf.is_empty() => return None,
                    None => {
                        let line = String::from_utf8_lossy(&buf).trim().to_string();
                        buf.clear();
                        return Some((line, (bytes, buf)));
                    }
                }
            }
        });

        let chunks = lines.filter_map(|line| async move {
            if let Some(err) = line.strip_prefix("__error__:") {
                return Some(Err(Error::Dependency(format!("completion stream read failed: {err}"))));
            }
            let data = line.strip_prefix("data: ")?;
            if data == "[DONE]" {
                return None;
            }
            let parsed: StreamChunk = match serde_json::from_str(data) {
                Ok(p) => p,
                Err(e) => return Some(Err(Error::Dependency(format!("malformed completion chunk: {e}")))),
            };
            if let Some(usage) = parsed.usage {
                return Some(Ok(CompletionChunk::Usage { prompt_tokens: usage.prompt_tokens, completion_tokens: usage.completion_tokens }));
            }
            let token = parsed.choices.into_iter().next()?.delta.content?;
            Some(Ok(CompletionChunk::Token(token)))
        });

        Ok(Box::pin(chunks))
    }
}
