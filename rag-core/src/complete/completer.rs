//! Streamed Completer (§4.7): drives the completion provider, accounts
//! for tokens, and applies early stopping once the accumulated answer
//! looks complete.

use std::sync::Arc;

use futures::StreamExt;

use crate::error::Result;
use crate::providers::{CompletionChunk, CompletionProvider, CompletionRequest};

const EARLY_STOP_MIN_TOKENS: usize = 100;
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub stopped_early: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct CompleterConfig {
    pub early_stop_confidence: f32,
}

impl Default for CompleterConfig {
    fn default() -> Self {
        Self { early_stop_confidence: DEFAULT_CONFIDENCE }
    }
}

pub struct Completer {
    provider: Arc<dyn CompletionProvider>,
    config: CompleterConfig,
}

impl Completer {
    #[must_use]
    pub fn new(provider: Arc<dyn CompletionProvider>, config: CompleterConfig) -> Self {
        Self { provider, config }
    }

    /// Drive the provider to completion, applying early stopping once at
    /// least 100 tokens have been produced and the running text looks
    /// complete.
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutcome> {
        self.complete_streaming(request, None).await
    }

    /// As [`Completer::complete`], but forwards each token to `token_sink`
    /// as it arrives so a caller can relay it to a live client instead of
    /// waiting for the whole answer (§5 streaming ordering).
    pub async fn complete_streaming(
        &self,
        request: CompletionRequest,
        token_sink: Option<&tokio::sync::mpsc::UnboundedSender<String>>,
    ) -> Result<CompletionOutcome> {
        let system_len = request.system_prompt.len();
        let user_len = request.user_prompt.len();
        let mut stream = self.provider.complete(request).await?;

        let mut text = String::new();
        let mut token_count = 0usize;
        let mut reported_prompt_tokens: Option<u32> = None;
        let mut reported_completion_tokens: Option<u32> = None;
        let mut stopped_early = false;

        while let Some(chunk) = stream.next().await {
            match chunk? {
                CompletionChunk::Token(token) => {
                    if let Some(sink) = token_sink {
                        let _ = sink.send(token.clone());
                    }
                    text.push_str(&token);
                    token_count += 1;

                    if token_count >= EARLY_STOP_MIN_TOKENS
                        && completeness(&text) >= self.config.early_stop_confidence
                    {
                        stopped_early = true;
                        break;
                    }
                }
                CompletionChunk::Usage { prompt_tokens, completion_tokens } => {
                    reported_prompt_tokens = prompt_tokens;
                    reported_completion_tokens = completion_tokens;
                }
            }
        }

        let prompt_tokens = reported_prompt_tokens.unwrap_or_else(|| estimate_tokens(system_len + user_len));
        let completion_tokens = reported_completion_tokens.unwrap_or(token_count as u32);

        Ok(CompletionOutcome { text, prompt_tokens, completion_tokens, stopped_early })
    }
}

fn estimate_tokens(chars: usize) -> u32 {
    chars.div_ceil(4) as u32
}

/// Completeness heuristic (§4.7): at least one complete sentence, the
/// text ends in terminal punctuation, and average words-per-sentence
/// isn't suspiciously low (a sign of a cut-off fragment).
fn completeness(text: &str) -> f32 {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return 0.0;
    }

    let ends_with_punctuation = trimmed.ends_with(['.', '!', '?']);
    let sentences: Vec<&str> = trimmed
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let has_complete_sentence = !sentences.is_empty() && ends_with_punctuation;

    let avg_words_per_sentence = if sentences.is_empty() {
        0.0
    } else {
        let total_words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
        total_words as f32 / sentences.len() as f32
    };
    let sentence_length_score = (avg_words_per_sentence / 8.0).clamp(0.0, 1.0);

    let mut score = 0.0;
    if has_complete_sentence {
        score += 0.5;
    }
    if ends_with_punctuation {
        score += 0.3;
    }
    score += 0.2 * sentence_length_score;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_sentence_scores_higher_than_fragment() {
        let full = completeness("The dragon flew over the mountain and vanished into the clouds.");
        let fragment = completeness("The dragon flew over the mount");
        assert!(full > fragment);
    }

    #[test]
    fn empty_text_has_zero_completeness() {
        assert_eq!(completeness(""), 0.0);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(5), 2);
        assert_eq!(estimate_tokens(4), 1);
        assert_eq!(estimate_tokens(0), 0);
    }
}
