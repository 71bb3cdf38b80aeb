//! `SecurityContext`: the explicit value threaded through cache and
//! retrieval calls, replacing "mock request" objects built only to reuse
//! security-aware code paths (§9).

use uuid::Uuid;

/// Identity and request metadata relevant to access control, auditing and
/// rate limiting. Constructed once by the auth façade and passed by value
/// to every downstream call that needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityContext {
    pub user_id: Option<Uuid>,
    pub ip: String,
    pub endpoint: String,
    pub is_authenticated: bool,
}

impl SecurityContext {
    #[must_use]
    pub fn anonymous(ip: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            user_id: None,
            ip: ip.into(),
            endpoint: endpoint.into(),
            is_authenticated: false,
        }
    }

    #[must_use]
    pub fn authenticated(user_id: Uuid, ip: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            ip: ip.into(),
            endpoint: endpoint.into(),
            is_authenticated: true,
        }
    }
}
