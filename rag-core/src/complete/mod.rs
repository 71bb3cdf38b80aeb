//! Streamed Completer (§4.7).

pub mod completer;

pub use completer::{CompleterConfig, CompletionOutcome, Completer, DEFAULT_CONFIDENCE};
