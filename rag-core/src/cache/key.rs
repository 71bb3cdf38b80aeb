//! Cache Key Generator (§4.2): deterministic primary and semantic keys
//! derived from a request's salient fields.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::{CachePriority, CacheKeyResult, CacheSecurityLevel, ContentType};

const MAX_KEY_LEN: usize = 256;
const VERSION_TAG: &str = "v1";

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "in", "on", "at", "to", "for", "is", "are", "was", "were", "and", "or",
    "this", "that", "it", "with", "as", "by", "be",
];

const HOT_PATTERNS: &[&str] = &["what is", "who is", "when is", "where is", "how is", "define", "summarize", "tell me about"];

/// The request fields relevant to key construction. `stable_payload` is
/// the caller-provided canonicalized JSON of the request with volatile
/// fields (timestamps, request ids) already stripped.
#[derive(Debug, Clone)]
pub struct KeyRequest<'a> {
    pub message: &'a str,
    pub selection: Option<&'a str>,
    pub chapter_idx: Option<u32>,
    pub content_type: ContentType,
    pub book_id: Uuid,
    pub user_id: Option<Uuid>,
    pub security_level: CacheSecurityLevel,
    pub priority: CachePriority,
    pub stable_payload: &'a str,
    pub access_count: u64,
}

pub struct CacheKeyGenerator;

impl CacheKeyGenerator {
    #[must_use]
    pub fn generate(request: &KeyRequest<'_>) -> CacheKeyResult {
        let namespace = security_namespace(request.user_id, request.security_level);
        let hot = matches_hot_pattern(request.message) || request.access_count >= 5;

        let content_hash = hash_hex(request.stable_payload);

        let mut parts = vec![VERSION_TAG.to_string(), namespace.clone(), request.content_type.as_str().to_string()];
        if hot {
            parts.push("hot".to_string());
        }
        parts.push(format!("book:{}", request.book_id));
        if let Some(idx) = request.chapter_idx {
            parts.push(format!("ch:{idx}"));
        }
        parts.push(content_hash);
        parts.push(priority_tag(request.priority).to_string());

        let raw_key = parts.join(":");
        let primary_key = enforce_length(&raw_key);

        let semantic_key = semantic_key(request.content_type, request.message, request.selection);

        CacheKeyResult {
            primary_key,
            semantic_key,
            namespace,
            tags: parts,
            strategy_label: if hot { "hot".to_string() } else { "normal".to_string() },
            hot_path: hot,
            security_level: request.security_level,
            ttl_hint_secs: request.content_type.base_ttl_secs(),
        }
    }
}

fn security_namespace(user_id: Option<Uuid>, level: CacheSecurityLevel) -> String {
    let base = match user_id {
        Some(id) => format!("auth:{}", hash_hex(&id.to_string())),
        None => "public".to_string(),
    };
    if level == CacheSecurityLevel::Encrypted {
        format!("{base}:enc")
    } else {
        base
    }
}

fn priority_tag(priority: CachePriority) -> &'static str {
    match priority {
        CachePriority::Critical => "p:critical",
        CachePriority::Normal => "p:normal",
        CachePriority::Low => "p:low",
    }
}

fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn enforce_length(key: &str) -> String {
    if key.len() <= MAX_KEY_LEN {
        return key.to_string();
    }
    let suffix = hash_hex(key);
    let keep = MAX_KEY_LEN.saturating_sub(suffix.len() + 1);
    format!("{}:{}", &key[..keep.min(key.len())], suffix)
}

#[must_use]
pub fn matches_hot_pattern(message: &str) -> bool {
    let lower = message.to_lowercase();
    HOT_PATTERNS.iter().any(|p| lower.starts_with(p) || lower.contains(p))
}

fn semantic_key(content_type: ContentType, message: &str, selection: Option<&str>) -> String {
    let combined = match selection {
        Some(sel) => format!("{message} {sel}"),
        None => message.to_string(),
    };

    let mut tokens: Vec<String> = combined
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect();

    tokens.truncate(8);
    tokens.sort();

    let hash = hash_hex(&tokens.join(" "));
    format!("sem:{}:{}", content_type.as_str(), hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_request(user_id: Option<Uuid>) -> KeyRequest<'static> {
        KeyRequest {
            message: "what is the meaning of this chapter",
            selection: None,
            chapter_idx: Some(3),
            content_type: ContentType::Response,
            book_id: Uuid::nil(),
            user_id,
            security_level: CacheSecurityLevel::Public,
            priority: CachePriority::Normal,
            stable_payload: "{}",
            access_count: 0,
        }
    }

    #[test]
    fn public_requests_from_different_users_share_a_key() {
        let a = CacheKeyGenerator::generate(&KeyRequest { security_level: CacheSecurityLevel::Public, ..base_request(Some(Uuid::new_v4())) });
        let b = CacheKeyGenerator::generate(&KeyRequest { security_level: CacheSecurityLevel::Public, ..base_request(Some(Uuid::new_v4())) });
        assert_eq!(a.namespace, "public");
        assert_eq!(b.namespace, "public");
    }

    #[test]
    fn auth_namespace_differs_per_user() {
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();
        let a = CacheKeyGenerator::generate(&base_request(Some(user_a)));
        let b = CacheKeyGenerator::generate(&base_request(Some(user_b)));
        assert_ne!(a.primary_key, b.primary_key);
    }

    #[test]
    fn hot_pattern_is_detected_from_message() {
        let request = base_request(None);
        let result = CacheKeyGenerator::generate(&request);
        assert!(result.hot_path);
    }

    #[test]
    fn long_keys_are_truncated_with_hash_suffix() {
        let long_payload = "x".repeat(1000);
        let request = KeyRequest { stable_payload: &long_payload, ..base_request(None) };
        let result = CacheKeyGenerator::generate(&request);
        assert!(result.primary_key.len() <= MAX_KEY_LEN);
    }

    #[test]
    fn semantic_key_ignores_stopwords_and_order() {
        let a = semantic_key(ContentType::Response, "what is the dragon doing", None);
        let b = semantic_key(ContentType::Response, "doing dragon what is", None);
        assert_eq!(a, b);
    }
}
