//! Core request-fulfillment logic for the reading-companion service: the
//! RAG pipeline, context budget manager, multi-layer cache, and the
//! value types and external-collaborator traits they're built from.
//!
//! This crate is storage- and transport-agnostic. It depends on the
//! outside world only through the traits in [`persistence`] and
//! [`providers`]; `rag-storage-sql`, `rag-cache-redb` and `rag-server`
//! supply the concrete implementations and the HTTP-facing rate
//! limiter, auth façade and input validator that sit in front of it.

pub mod budget;
pub mod cache;
pub mod chunk;
pub mod circuit_breaker;
pub mod complete;
pub mod config;
pub mod embeddings;
pub mod enhance;
pub mod error;
pub mod persistence;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod security;
pub mod telemetry;
pub mod types;
pub mod vectorstore;

pub use chunk::Chunker;
pub use config::Config;
pub use error::{Error, Result};
