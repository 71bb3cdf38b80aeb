//! Vector Index, RAG Retriever and MMR Reranker (§4.4, §4.5).

pub mod index;
pub mod mmr;
pub mod retriever;

pub use index::{IndexedChunk, ScoredChunk, VectorIndex};
pub use mmr::{RankedChunk, DEFAULT_K_FINAL, DEFAULT_LAMBDA};
pub use retriever::{Retriever, RetrieverConfig};
