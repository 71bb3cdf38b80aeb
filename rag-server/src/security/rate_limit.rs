//! Sliding-window rate limiter (spec §4.11): one window per
//! `(category, key)` pair, counted over rows in `rate_limit_entries`.
//! Fails closed — any persistence error denies the request.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rag_core::config::RateLimitCategoryConfig;
use rag_core::error::{Error, Result};
use rag_core::persistence::{PersistenceAdapter, RateLimitEntry};

/// The category a request belongs to, each with its own `(maxRequests,
/// windowMs)` budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitCategory {
    Auth,
    General,
    Upload,
    Chat,
    AutoNotes,
}

impl RateLimitCategory {
    fn tag(self) -> &'static str {
        match self {
            RateLimitCategory::Auth => "auth",
            RateLimitCategory::General => "general",
            RateLimitCategory::Upload => "upload",
            RateLimitCategory::Chat => "chat",
            RateLimitCategory::AutoNotes => "auto_notes",
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub enum Decision {
    Allow { remaining: u32 },
    Deny { retry_after_secs: u64 },
}

pub struct RateLimiter {
    persistence: Arc<dyn PersistenceAdapter>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(persistence: Arc<dyn PersistenceAdapter>) -> Self {
        Self { persistence }
    }

    /// Check and, if allowed, record one request against `category`'s
    /// window for `identifier` (usually the caller's IP).
    pub async fn check(
        &self,
        category: RateLimitCategory,
        config: RateLimitCategoryConfig,
        identifier: &str,
        ip: &str,
        user_agent: &str,
        endpoint: &str,
    ) -> Result<Decision> {
        let key = format!("{}:{identifier}", category.tag());
        let now = Utc::now();
        let window_start = now - ChronoDuration::milliseconds(config.window_ms as i64);

        let check = async {
            self.persistence.purge_rate_limit_entries_for_key(&key, window_start).await?;
            let count = self.persistence.count_rate_limit_entries(&key).await?;
            if count >= config.max_requests {
                return Ok::<Decision, Error>(Decision::Deny { retry_after_secs: config.window_ms / 1000 });
            }
            self.persistence
                .insert_rate_limit_entry(RateLimitEntry {
                    key,
                    timestamp: now,
                    ip: ip.to_string(),
                    user_agent: user_agent.to_string(),
                    endpoint: endpoint.to_string(),
                })
                .await?;
            Ok(Decision::Allow { remaining: config.max_requests - count - 1 })
        };

        match check.await {
            Ok(decision) => Ok(decision),
            Err(_) => Ok(Decision::Deny { retry_after_secs: config.window_ms / 1000 }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_test_utils::FakePersistence;

    #[tokio::test]
    async fn admits_requests_under_the_limit() {
        let limiter = RateLimiter::new(Arc::new(FakePersistence::new()));
        let config = RateLimitCategoryConfig { max_requests: 3, window_ms: 60_000 };
        for _ in 0..3 {
            let decision = limiter.check(RateLimitCategory::General, config, "1.2.3.4", "1.2.3.4", "ua", "/ask").await.unwrap();
            assert!(matches!(decision, Decision::Allow { .. }));
        }
    }

    #[tokio::test]
    async fn denies_once_the_window_is_full() {
        let limiter = RateLimiter::new(Arc::new(FakePersistence::new()));
        let config = RateLimitCategoryConfig { max_requests: 1, window_ms: 60_000 };
        let first = limiter.check(RateLimitCategory::Auth, config, "9.9.9.9", "9.9.9.9", "ua", "/login").await.unwrap();
        assert!(matches!(first, Decision::Allow { .. }));
        let second = limiter.check(RateLimitCategory::Auth, config, "9.9.9.9", "9.9.9.9", "ua", "/login").await.unwrap();
        assert!(matches!(second, Decision::Deny { .. }));
    }
}
