//! Auth Façade (spec §4.11): resolves a bearer credential to a
//! [`SecurityContext`], tracking failed attempts per IP and blocking
//! after too many within a configurable window. Fails closed, same as
//! the rate limiter it sits beside.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use rag_core::config::RateLimitConfig;
use rag_core::error::{Error, Result};
use rag_core::persistence::{PersistenceAdapter, RateLimitEntry};
use rag_core::providers::IdentityProvider;
use rag_core::security::audit::{AuditEntry, AuditEventType, AuditLogLevel, AuditLogger};
use rag_core::types::SecurityContext;

fn block_key(ip: &str) -> String {
    format!("auth_block:{ip}")
}

pub struct AuthFacade {
    identity: Arc<dyn IdentityProvider>,
    persistence: Arc<dyn PersistenceAdapter>,
    audit: AuditLogger,
    config: RateLimitConfig,
}

impl AuthFacade {
    #[must_use]
    pub fn new(identity: Arc<dyn IdentityProvider>, persistence: Arc<dyn PersistenceAdapter>, audit: AuditLogger, config: RateLimitConfig) -> Self {
        Self { identity, persistence, audit, config }
    }

    /// Resolve `bearer_token` to a [`SecurityContext`]. `None` yields an
    /// anonymous context (valid for public-book requests); a present but
    /// invalid token is a failure that counts toward the IP block.
    pub async fn authenticate(&self, bearer_token: Option<&str>, ip: &str, endpoint: &str) -> Result<SecurityContext> {
        let Some(token) = bearer_token else {
            return Ok(SecurityContext::anonymous(ip, endpoint));
        };

        if self.is_blocked(ip).await? {
            self.audit.log(
                AuditEntry::new(AuditEventType::AccountLocked, ip, endpoint, Utc::now()).with_level(AuditLogLevel::Warn),
            );
            return Err(Error::Forbidden("too many failed login attempts, try again later".to_string()));
        }

        match self.resolve_and_verify(token).await {
            Ok(user_id) => {
                self.reset_failures(ip).await?;
                self.audit.log(
                    AuditEntry::new(AuditEventType::AuthenticationSuccess, ip, endpoint, Utc::now()).with_user(user_id),
                );
                Ok(SecurityContext::authenticated(user_id, ip, endpoint))
            }
            Err(err) => {
                self.record_failure(ip, endpoint).await?;
                self.audit.log(
                    AuditEntry::new(AuditEventType::AuthenticationFailure, ip, endpoint, Utc::now()).with_level(AuditLogLevel::Warn),
                );
                Err(err)
            }
        }
    }

    async fn resolve_and_verify(&self, token: &str) -> Result<uuid::Uuid> {
        let user_id = self.identity.resolve(token).await?;
        match self.persistence.get_user(user_id).await? {
            Some(_) => Ok(user_id),
            None => Err(Error::Unauthenticated),
        }
    }

    async fn is_blocked(&self, ip: &str) -> Result<bool> {
        let key = block_key(ip);
        let window_start = Utc::now() - ChronoDuration::from_std(self.config.auth_failure_block_duration).unwrap_or_default();
        let check = async {
            self.persistence.purge_rate_limit_entries_for_key(&key, window_start).await?;
            self.persistence.count_rate_limit_entries(&key).await
        };
        match check.await {
            Ok(count) => Ok(count >= self.config.auth_failure_block_threshold),
            Err(_) => Ok(true),
        }
    }

    async fn record_failure(&self, ip: &str, endpoint: &str) -> Result<()> {
        self.persistence
            .insert_rate_limit_entry(RateLimitEntry {
                key: block_key(ip),
                timestamp: Utc::now(),
                ip: ip.to_string(),
                user_agent: String::new(),
                endpoint: endpoint.to_string(),
            })
            .await
    }

    /// On successful auth, drop all prior failure rows for this IP so the
    /// block window resets (§4.11 "On success, reset the failed counter").
    async fn reset_failures(&self, ip: &str) -> Result<()> {
        let far_future = Utc::now() + ChronoDuration::seconds(1);
        self.persistence.purge_rate_limit_entries_for_key(&block_key(ip), far_future).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::types::User;
    use rag_test_utils::{FakeIdentityProvider, FakePersistence};

    fn facade(identity: Arc<FakeIdentityProvider>, persistence: Arc<FakePersistence>) -> AuthFacade {
        AuthFacade::new(identity, persistence, AuditLogger::disabled(), RateLimitConfig::default())
    }

    #[tokio::test]
    async fn missing_token_is_anonymous() {
        let facade = facade(Arc::new(FakeIdentityProvider::new()), Arc::new(FakePersistence::new()));
        let ctx = facade.authenticate(None, "1.2.3.4", "/chat").await.unwrap();
        assert!(!ctx.is_authenticated);
    }

    #[tokio::test]
    async fn valid_token_resolves_to_authenticated_context() {
        let identity = Arc::new(FakeIdentityProvider::new());
        let persistence = Arc::new(FakePersistence::new());
        let user_id = uuid::Uuid::new_v4();
        identity.register("tok-123", user_id);
        persistence.seed_user(User { id: user_id, email: "reader@example.com".into(), created_at: Utc::now() });

        let facade = facade(identity, persistence);
        let ctx = facade.authenticate(Some("tok-123"), "1.2.3.4", "/chat").await.unwrap();
        assert!(ctx.is_authenticated);
        assert_eq!(ctx.user_id, Some(user_id));
    }

    #[tokio::test]
    async fn invalid_token_is_unauthenticated() {
        let facade = facade(Arc::new(FakeIdentityProvider::new()), Arc::new(FakePersistence::new()));
        let err = facade.authenticate(Some("no-such-token"), "5.5.5.5", "/chat").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[tokio::test]
    async fn blocks_ip_after_threshold_failures() {
        let mut config = RateLimitConfig::default();
        config.auth_failure_block_threshold = 2;
        let identity = Arc::new(FakeIdentityProvider::new());
        let persistence = Arc::new(FakePersistence::new());
        let facade = AuthFacade::new(identity, persistence, AuditLogger::disabled(), config);

        for _ in 0..2 {
            let _ = facade.authenticate(Some("bad-token"), "9.9.9.9", "/chat").await;
        }
        let err = facade.authenticate(Some("bad-token"), "9.9.9.9", "/chat").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }
}
