//! Input Validator (spec §4.12): a small declarative schema engine —
//! required/length/pattern/PII rules per field — applied to the one
//! request shape this server accepts. Unknown-field rejection and basic
//! type checking are already enforced by serde's `deny_unknown_fields`
//! on [`crate::protocol::ChatRequest`]; this module covers the semantic
//! rules serde can't express.

use std::sync::LazyLock;

use rag_core::error::{Error, Result};
use rag_core::security::pii::detect;
use regex::Regex;

use crate::protocol::{ChatRequest, SelectionContext, MAX_SELECTION_CHARS};

/// A single field's declarative rule set. Not every field uses every
/// rule; `None` / `false` means "not checked".
struct FieldRule {
    name: &'static str,
    required: bool,
    min_len: Option<usize>,
    max_len: Option<usize>,
    pattern: Option<&'static LazyLock<Regex>>,
    sanitize: bool,
    reject_pii: bool,
}

impl FieldRule {
    const fn new(name: &'static str) -> Self {
        Self { name, required: false, min_len: None, max_len: None, pattern: None, sanitize: false, reject_pii: false }
    }
}

static BCP47: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[A-Z]{2})?$").expect("valid regex"));

const MAX_MESSAGE_CHARS: usize = 4000;
const MAX_SELECTION_ANCHOR_CHARS: usize = 500;

fn message_rule() -> FieldRule {
    FieldRule { required: true, min_len: Some(1), max_len: Some(MAX_MESSAGE_CHARS), sanitize: true, ..FieldRule::new("message") }
}

fn target_lang_rule() -> FieldRule {
    FieldRule { pattern: Some(&BCP47), ..FieldRule::new("target_lang") }
}

fn selection_text_rule() -> FieldRule {
    FieldRule {
        required: true,
        max_len: Some(MAX_SELECTION_CHARS),
        sanitize: true,
        reject_pii: true,
        ..FieldRule::new("context.text")
    }
}

fn selection_anchor_rule(name: &'static str) -> FieldRule {
    FieldRule { max_len: Some(MAX_SELECTION_ANCHOR_CHARS), sanitize: true, ..FieldRule::new(name) }
}

/// Strip control characters and HTML tags, then collapse runs of
/// whitespace, matching the sanitize flag in §4.12.
#[must_use]
pub fn sanitize_text(text: &str) -> String {
    static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));
    static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
    static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

    let without_control = CONTROL_CHARS.replace_all(text, "");
    let without_html = HTML_TAG.replace_all(&without_control, "");
    WHITESPACE.replace_all(without_html.trim(), " ").into_owned()
}

fn check_field(rule: &FieldRule, value: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = value else {
        if rule.required {
            return Err(Error::Validation(format!("{} is required", rule.name)));
        }
        return Ok(None);
    };

    let value = if rule.sanitize { sanitize_text(raw) } else { raw.to_string() };

    if rule.required && value.is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", rule.name)));
    }
    if let Some(min_len) = rule.min_len {
        if value.chars().count() < min_len {
            return Err(Error::Validation(format!("{} is shorter than the minimum length", rule.name)));
        }
    }
    if let Some(max_len) = rule.max_len {
        if value.chars().count() > max_len {
            if rule.name == "context.text" {
                return Err(Error::PayloadTooLarge(format!("{} exceeds {max_len} characters", rule.name)));
            }
            return Err(Error::Validation(format!("{} exceeds {max_len} characters", rule.name)));
        }
    }
    if let Some(pattern) = rule.pattern {
        if !pattern.is_match(&value) {
            return Err(Error::Validation(format!("{} does not match the required format", rule.name)));
        }
    }
    if rule.reject_pii {
        if let Some(kind) = detect(&value) {
            return Err(Error::Validation(format!("{} appears to contain sensitive personal information ({kind:?})", rule.name)));
        }
    }

    Ok(Some(value))
}

/// Validate and sanitize a chat request against the declarative chat
/// schema, returning a new request with sanitized text fields.
pub fn validate_chat_request(request: ChatRequest) -> Result<ChatRequest> {
    let message = check_field(&message_rule(), Some(&request.message))?.expect("required field always returns Some");

    if let Some(target_lang) = &request.target_lang {
        check_field(&target_lang_rule(), Some(target_lang))?;
    }

    let context = match request.context {
        Some(ctx) => {
            let text = check_field(&selection_text_rule(), Some(&ctx.text))?.expect("required field always returns Some");
            let before = match &ctx.before {
                Some(before) => check_field(&selection_anchor_rule("context.before"), Some(before))?,
                None => None,
            };
            let after = match &ctx.after {
                Some(after) => check_field(&selection_anchor_rule("context.after"), Some(after))?,
                None => None,
            };
            Some(SelectionContext { text, before, after })
        }
        None => None,
    };

    Ok(ChatRequest { message, context, ..request })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn base_request() -> ChatRequest {
        ChatRequest {
            message: "what happens in chapter 3?".to_string(),
            book_id: Uuid::new_v4(),
            intent: None,
            target_lang: None,
            conversation_id: None,
            context: None,
        }
    }

    #[test]
    fn rejects_empty_message() {
        let request = ChatRequest { message: "   ".into(), ..base_request() };
        let err = validate_chat_request(request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_oversized_selection_with_413() {
        let request = ChatRequest {
            context: Some(SelectionContext { text: "x".repeat(MAX_SELECTION_CHARS + 1), before: None, after: None }),
            ..base_request()
        };
        let err = validate_chat_request(request).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge(_)));
    }

    #[test]
    fn rejects_malformed_target_lang() {
        let request = ChatRequest { target_lang: Some("english".into()), ..base_request() };
        assert!(validate_chat_request(request).is_err());
    }

    #[test]
    fn accepts_valid_bcp47_region_tag() {
        let request = ChatRequest { target_lang: Some("pt-BR".into()), ..base_request() };
        assert!(validate_chat_request(request).is_ok());
    }

    #[test]
    fn sanitizes_html_and_control_characters_from_message() {
        let request = ChatRequest { message: "<b>hello</b>\u{0007} world".into(), ..base_request() };
        let sanitized = validate_chat_request(request).unwrap();
        assert_eq!(sanitized.message, "hello world");
    }

    #[test]
    fn rejects_pii_in_selection_text() {
        let request = ChatRequest {
            context: Some(SelectionContext { text: "my ssn is 123-45-6789".into(), before: None, after: None }),
            ..base_request()
        };
        assert!(validate_chat_request(request).is_err());
    }
}
