//! Append-only structured audit logging (§4.11, §6): records access and
//! authentication events for security compliance and incident
//! investigation, independent of the durable `audit_events` table that
//! `rag-storage-sql` persists them to.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::persistence::{AuditEventRow, AuditSeverity};

/// Severity level for audit log entries, distinct from the coarser
/// [`AuditSeverity`] persisted rows carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuditLogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl fmt::Display for AuditLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        };
        write!(f, "{name}")
    }
}

impl From<AuditLogLevel> for AuditSeverity {
    fn from(level: AuditLogLevel) -> Self {
        match level {
            AuditLogLevel::Debug | AuditLogLevel::Info => AuditSeverity::Info,
            AuditLogLevel::Warn | AuditLogLevel::Error => AuditSeverity::Warning,
            AuditLogLevel::Critical => AuditSeverity::Critical,
        }
    }
}

/// The kinds of events the request-fulfillment core audits (§4.11,
/// §4.12, §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AuditEventType {
    AuthenticationSuccess,
    AuthenticationFailure,
    AccountLocked,
    AccessDenied,
    RateLimitDenied,
    CacheInvalidated,
    RlsViolationBlocked,
    PiiRejected,
    ValidationRejected,
    EnhancementFallback,
    RequestCompleted,
    QualityRollbackTripped,
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthenticationSuccess => "auth_success",
            Self::AuthenticationFailure => "auth_failure",
            Self::AccountLocked => "account_locked",
            Self::AccessDenied => "access_denied",
            Self::RateLimitDenied => "rate_limit_denied",
            Self::CacheInvalidated => "cache_invalidated",
            Self::RlsViolationBlocked => "rls_violation_blocked",
            Self::PiiRejected => "pii_rejected",
            Self::ValidationRejected => "validation_rejected",
            Self::EnhancementFallback => "enhancement_fallback",
            Self::RequestCompleted => "request_completed",
            Self::QualityRollbackTripped => "quality_rollback_tripped",
        };
        write!(f, "{name}")
    }
}

/// Where formatted audit log lines go, distinct from the durable
/// `audit_events` row (always written regardless of this setting).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuditOutput {
    #[default]
    Tracing,
    None,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub enabled: bool,
    pub log_level: AuditLogLevel,
    pub output: AuditOutput,
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { enabled: true, log_level: AuditLogLevel::Info, output: AuditOutput::Tracing, buffer_size: 1000 }
    }
}

impl AuditConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("RAG_AUDIT_ENABLED") {
            config.enabled = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
        if let Ok(v) = std::env::var("RAG_AUDIT_LEVEL") {
            config.log_level = match v.to_lowercase().as_str() {
                "debug" => AuditLogLevel::Debug,
                "warn" | "warning" => AuditLogLevel::Warn,
                "error" => AuditLogLevel::Error,
                "critical" => AuditLogLevel::Critical,
                _ => AuditLogLevel::Info,
            };
        }
        config
    }

    #[must_use]
    pub fn should_log(&self, level: AuditLogLevel) -> bool {
        self.enabled && level_rank(level) >= level_rank(self.log_level)
    }
}

fn level_rank(level: AuditLogLevel) -> u8 {
    match level {
        AuditLogLevel::Debug => 0,
        AuditLogLevel::Info => 1,
        AuditLogLevel::Warn => 2,
        AuditLogLevel::Error => 3,
        AuditLogLevel::Critical => 4,
    }
}

/// A single audit log entry, mirrored onto a durable [`AuditEventRow`]
/// when it's flushed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub level: AuditLogLevel,
    pub user_id: Option<Uuid>,
    pub ip: String,
    pub endpoint: String,
    pub details: HashMap<String, serde_json::Value>,
}

impl AuditEntry {
    #[must_use]
    pub fn new(event_type: AuditEventType, ip: impl Into<String>, endpoint: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            timestamp: now,
            event_type,
            level: AuditLogLevel::Info,
            user_id: None,
            ip: ip.into(),
            endpoint: endpoint.into(),
            details: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: AuditLogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn into_row(self) -> AuditEventRow {
        AuditEventRow {
            id: self.entry_id,
            timestamp: self.timestamp,
            event_type: self.event_type.to_string(),
            user_id: self.user_id,
            ip: self.ip,
            endpoint: self.endpoint,
            details: serde_json::Value::Object(self.details.into_iter().collect()),
            severity: self.level.into(),
        }
    }
}

/// Async, buffered audit logger. Entries are queued onto an unbounded
/// channel and written by a background task so the request path never
/// blocks on logging (§5: audit writes are not a suspension point).
#[derive(Clone)]
pub struct AuditLogger {
    config: AuditConfig,
    sender: Option<mpsc::UnboundedSender<AuditEntry>>,
}

impl AuditLogger {
    #[must_use]
    pub fn new(config: AuditConfig) -> Self {
        let sender = if config.enabled && config.output != AuditOutput::None {
            let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();
            tokio::spawn(async move {
                while let Some(entry) = rx.recv().await {
                    Self::write_entry(&entry);
                }
            });
            Some(tx)
        } else {
            None
        };
        Self { config, sender }
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self { config: AuditConfig { enabled: false, ..Default::default() }, sender: None }
    }

    /// Non-blocking: queues the entry, dropping it only if audit logging
    /// is disabled or its level falls below the configured floor.
    pub fn log(&self, entry: AuditEntry) {
        if !self.config.should_log(entry.level) {
            return;
        }
        if let Some(sender) = &self.sender {
            if let Err(err) = sender.send(entry) {
                debug!("failed to queue audit entry: {err}");
            }
        }
    }

    fn write_entry(entry: &AuditEntry) {
        let Ok(json) = serde_json::to_string(entry) else {
            error!("failed to serialize audit entry");
            return;
        };
        match entry.level {
            AuditLogLevel::Debug => debug!(target: "audit", "{json}"),
            AuditLogLevel::Info => info!(target: "audit", "{json}"),
            AuditLogLevel::Warn => warn!(target: "audit", "{json}"),
            AuditLogLevel::Error | AuditLogLevel::Critical => error!(target: "audit", "{json}"),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logger_never_sends() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        logger.log(AuditEntry::new(AuditEventType::AccessDenied, "127.0.0.1", "/chat", Utc::now()));
    }

    #[test]
    fn should_log_respects_configured_floor() {
        let config = AuditConfig { log_level: AuditLogLevel::Warn, ..Default::default() };
        assert!(!config.should_log(AuditLogLevel::Info));
        assert!(config.should_log(AuditLogLevel::Critical));
    }

    #[test]
    fn entry_converts_into_persistable_row() {
        let entry = AuditEntry::new(AuditEventType::AuthenticationFailure, "10.0.0.1", "/login", Utc::now())
            .with_level(AuditLogLevel::Warn)
            .with_detail("reason", "bad_token");
        let row = entry.into_row();
        assert_eq!(row.event_type, "auth_failure");
        assert_eq!(row.severity, AuditSeverity::Warning);
    }
}
