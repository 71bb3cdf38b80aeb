//! Wire protocol for the answer endpoint (spec §6): the chat request
//! body, the ordered streamed event sequence, and the non-streaming
//! error envelope.

use chrono::{DateTime, Utc};
use rag_core::error::Error;
use rag_core::types::ChunkRef;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The intents a chat request may carry. Absence defaults to `Ask` and
/// must behave identically to an explicit `ask` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Ask,
    Translate,
    Explain,
    Disambiguate,
    Summarize,
    Enhance,
}

impl Default for Intent {
    fn default() -> Self {
        Self::Ask
    }
}

/// A reader's selected passage, anchored with optional surrounding
/// context. `text` is capped at 300 characters (§6, §8 boundary).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionContext {
    pub text: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
}

pub const MAX_SELECTION_CHARS: usize = 300;

/// The chat request body. Unknown fields are rejected (§6); this is
/// enforced by `#[serde(deny_unknown_fields)]` rather than a hand-rolled
/// check, matching how the rest of the stack leans on serde for shape
/// validation before the semantic [`crate::security::validate`] pass.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    pub message: String,
    pub book_id: Uuid,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub target_lang: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
    #[serde(default)]
    pub context: Option<SelectionContext>,
}

/// `{chapter_idx, start, end, similarity}` (§6).
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub chapter_idx: u32,
    pub start: usize,
    pub end: usize,
    pub similarity: f32,
}

impl SourceRef {
    #[must_use]
    pub fn new(chunk: ChunkRef, similarity: f32) -> Self {
        Self { chapter_idx: chunk.chapter_idx, start: chunk.start, end: chunk.end, similarity }
    }
}

/// `usage` event payload (§6).
#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub cost_usd: f64,
    pub model_used: String,
    pub cached: bool,
    pub budget_strategy: String,
    pub estimated_savings: f32,
    pub quality_score: f32,
    pub optimization_applied: bool,
}

/// `done` event payload (§6).
#[derive(Debug, Clone, Serialize)]
pub struct Done {
    pub completed_at: DateTime<Utc>,
    pub cached: bool,
}

/// `error` event payload (§6), also the inner shape of the non-streaming
/// [`ErrorEnvelope`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    #[must_use]
    pub fn from_error(err: &Error, request_id: Uuid, now: DateTime<Utc>) -> Self {
        let retry_after = match err {
            Error::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };
        Self {
            code: err.code().to_string(),
            message: user_facing_message(err),
            details: None,
            timestamp: now,
            request_id,
            retry_after,
        }
    }
}

/// Non-streaming error envelope (§6): `{error: {...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

/// A short, UI-safe message. Never leaks internal detail (IDs, stack
/// traces) for unexpected conditions (§7).
#[must_use]
pub fn user_facing_message(err: &Error) -> String {
    match err {
        Error::Validation(msg) | Error::PayloadTooLarge(msg) => msg.clone(),
        Error::Unauthenticated => "authentication required".to_string(),
        Error::Forbidden(_) => "you do not have access to this resource".to_string(),
        Error::RateLimited { .. } => "too many requests, please try again later".to_string(),
        Error::QuotaExceeded(_) => "quota exceeded".to_string(),
        Error::NotFound(_) => "the requested resource was not found".to_string(),
        Error::Dependency(_) | Error::CircuitBreakerOpen => "a dependent service is temporarily unavailable".to_string(),
        Error::DimensionMismatch { .. } | Error::CascadeCycle(_) | Error::CacheSecurityViolation(_) => {
            "an internal consistency check failed".to_string()
        }
        Error::Timeout => "the request took too long to complete".to_string(),
        Error::Cancelled => "the request was cancelled".to_string(),
        Error::Configuration(_) | Error::Serialization(_) | Error::Internal(_) => "an internal error occurred".to_string(),
    }
}

/// One event of the `[sources, token*, usage, done]` / `[..., error]`
/// sequence (§6). Ordering is enforced by the emitter in [`crate::core`],
/// not by this type.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    Sources(Vec<SourceRef>),
    Token(String),
    Usage(Usage),
    Done(Done),
    Error(ErrorBody),
}
