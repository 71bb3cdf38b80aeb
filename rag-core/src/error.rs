//! Crate-wide error type.
//!
//! Mirrors the error kinds enumerated in the request-fulfillment design:
//! validation, auth, rate-limit, not-found, dependency (embedding/completion
//! provider), consistency (dimension mismatch, cache security violation,
//! cascade cycle) and a catch-all internal variant.

/// Result type alias used throughout `rag-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the retrieval, caching, budgeting and security
/// subsystems.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request field failed schema or sanitization rules.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A field exceeded a hard size limit (e.g. `context.text` over 300
    /// characters), surfaced as 413 rather than the generic 400.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// No credential was presented, or the identity provider rejected it.
    #[error("unauthenticated")]
    Unauthenticated,

    /// The caller is authenticated but does not own the requested resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A sliding-window quota was exceeded; always carries a retry delay.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// A per-identity quota (distinct from the sliding-window limiter) was
    /// exceeded.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A referenced book, chapter or conversation does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding or completion provider failed. `retryable` mirrors the
    /// transient/permanent classification used by the retry policy.
    #[error("dependency failure ({0})")]
    Dependency(String),

    /// Two vectors that should share a dimension did not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension every vector in the index is expected to have.
        expected: usize,
        /// Dimension of the vector that was rejected.
        actual: usize,
    },

    /// A dependency-cascade invalidation would revisit a key already
    /// visited in the same cascade; the extra invalidation is refused.
    #[error("invalidation cascade cycle detected at key {0}")]
    CascadeCycle(String),

    /// A value could not be stored because it matched a sensitive-content
    /// pattern, or a stored entry matching one was found and purged.
    #[error("cache security policy violation: {0}")]
    CacheSecurityViolation(String),

    /// The operation could not complete before its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The circuit breaker guarding a dependency is open; the call was
    /// short-circuited without reaching the dependency.
    #[error("circuit breaker open")]
    CircuitBreakerOpen,

    /// The request was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// Malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other unexpected condition.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents a transient condition worth retrying
    /// with backoff (network blips, provider 5xx, timeouts). Used by the
    /// retry policy and by the circuit breaker's failure classification.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Dependency(_) | Error::Timeout | Error::CircuitBreakerOpen)
    }

    /// Stable machine-readable code for the wire error envelope (§6).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::PayloadTooLarge(_) => "payload_too_large",
            Error::Unauthenticated => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::RateLimited { .. } => "rate_limited",
            Error::QuotaExceeded(_) => "quota_exceeded",
            Error::NotFound(_) => "not_found",
            Error::Dependency(_) => "dependency_unavailable",
            Error::DimensionMismatch { .. } => "dimension_mismatch",
            Error::CascadeCycle(_) => "cascade_cycle",
            Error::CacheSecurityViolation(_) => "cache_security_violation",
            Error::Timeout => "timeout",
            Error::CircuitBreakerOpen => "circuit_breaker_open",
            Error::Cancelled => "cancelled",
            Error::Configuration(_) => "configuration_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// HTTP status this error maps to per §6/§7.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::PayloadTooLarge(_) => 413,
            Error::Unauthenticated => 401,
            Error::Forbidden(_) => 403,
            Error::NotFound(_) => 404,
            Error::RateLimited { .. } | Error::QuotaExceeded(_) => 429,
            Error::Dependency(_) | Error::CircuitBreakerOpen => 503,
            Error::Timeout => 504,
            Error::DimensionMismatch { .. }
            | Error::CascadeCycle(_)
            | Error::CacheSecurityViolation(_)
            | Error::Configuration(_)
            | Error::Serialization(_)
            | Error::Cancelled
            | Error::Internal(_) => 500,
        }
    }
}
