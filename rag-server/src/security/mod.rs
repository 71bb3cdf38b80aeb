//! Entry-point security: rate limiting, authentication and request
//! validation, applied in that order to every incoming request
//! (§9 dependency graph: Validator → RateLimiter → Auth → ...).

pub mod auth;
pub mod rate_limit;
pub mod validate;

pub use auth::AuthFacade;
pub use rate_limit::{Decision, RateLimitCategory, RateLimiter};
pub use validate::{sanitize_text, validate_chat_request};
