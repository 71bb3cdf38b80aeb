//! Shared PII pattern set (§4.10, §4.12): SSN, credit card, email, phone.
//! Consumed by the vector store's storage gate and the input validator's
//! feedback-schema detectors.

use regex::Regex;
use std::sync::LazyLock;

static SSN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("valid regex"));
static CREDIT_CARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d[ -]*?){13,16}\b").expect("valid regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[\w.+-]+@[\w-]+\.[\w.-]+\b").expect("valid regex"));
static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\+?1[-. ]?)?\(?\d{3}\)?[-. ]?\d{3}[-. ]?\d{4}\b").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiKind {
    Ssn,
    CreditCard,
    Email,
    Phone,
}

/// The first PII pattern `text` matches, if any.
#[must_use]
pub fn detect(text: &str) -> Option<PiiKind> {
    if SSN.is_match(text) {
        Some(PiiKind::Ssn)
    } else if CREDIT_CARD.is_match(text) {
        Some(PiiKind::CreditCard)
    } else if EMAIL.is_match(text) {
        Some(PiiKind::Email)
    } else if PHONE.is_match(text) {
        Some(PiiKind::Phone)
    } else {
        None
    }
}

#[must_use]
pub fn contains_pii(text: &str) -> bool {
    detect(text).is_some()
}
