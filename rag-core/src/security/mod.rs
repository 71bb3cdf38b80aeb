//! Security primitives shared across the request path: audit logging
//! (§4.11) and PII detection (§4.10, §4.12).
//!
//! The rate limiter, auth façade and input validator themselves live in
//! `rag-server`, since they're entry-point concerns wired to the HTTP
//! layer; this crate only carries what's domain logic.

pub mod audit;
pub mod pii;

pub use audit::{AuditConfig, AuditEntry, AuditEventType, AuditLogLevel, AuditLogger};
pub use pii::{contains_pii, detect, PiiKind};
