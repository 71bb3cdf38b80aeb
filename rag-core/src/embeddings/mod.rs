//! Embedding cache and similarity primitives (§4.3, §4.4, §4.5).

pub mod cache;
pub mod similarity;

pub use cache::EmbeddingCache;
