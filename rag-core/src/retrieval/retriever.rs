//! RAG Retriever (§4.4): query expansion, dual-query merge, semantic
//! dedup and relevance filtering on top of the [`VectorIndex`].

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::embeddings::similarity::jaccard_word_overlap;
use crate::error::Result;
use crate::providers::EmbeddingProvider;
use crate::retrieval::index::{ScoredChunk, VectorIndex};
use crate::types::ChunkRef;

/// Synonym expansions keyed by trigger phrase, applied to the query text
/// before a second embedding pass.
const EXPANSION_TABLE: &[(&str, &[&str])] = &[
    ("summary", &["summarize", "overview"]),
    ("summarize", &["summary", "overview"]),
    ("theme", &["motif", "meaning"]),
    ("character", &["protagonist", "figure"]),
];

const SEMANTIC_DEDUP_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone, Default)]
pub struct RetrieverConfig {
    pub top_k_initial: usize,
    pub relevance_floor: f32,
}

/// Retrieves and consolidates relevant chunks for a query against one
/// book's vector index.
pub struct Retriever {
    index: Arc<VectorIndex>,
    embeddings: Arc<dyn EmbeddingProvider>,
    config: RetrieverConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(index: Arc<VectorIndex>, embeddings: Arc<dyn EmbeddingProvider>, config: RetrieverConfig) -> Self {
        Self { index, embeddings, config }
    }

    /// Expand `query` with up to two synonyms if it mentions a trigger
    /// phrase. Returns `None` if the query is unchanged.
    #[must_use]
    pub fn expand_query(query: &str) -> Option<String> {
        let lower = query.to_lowercase();
        for (trigger, synonyms) in EXPANSION_TABLE {
            if lower.contains(trigger) {
                let addition = synonyms.join(" ");
                return Some(format!("{query} {addition}"));
            }
        }
        None
    }

    pub async fn retrieve(
        &self,
        book_id: Uuid,
        chapter_idx: Option<u32>,
        query: &str,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.embeddings.embed_text(query).await?;
        let mut hits = self.index.search(
            book_id,
            chapter_idx,
            &query_vector,
            0.0,
            self.config.top_k_initial,
        )?;

        if let Some(expanded) = Self::expand_query(query) {
            let expanded_vector = self.embeddings.embed_text(&expanded).await?;
            let expanded_hits = self.index.search(
                book_id,
                chapter_idx,
                &expanded_vector,
                0.0,
                self.config.top_k_initial,
            )?;
            hits = merge_by_location(hits, expanded_hits);
        }

        let deduped = semantic_dedup(hits);
        Ok(deduped
            .into_iter()
            .filter(|c| c.similarity >= self.config.relevance_floor)
            .collect())
    }
}

fn location_key(chunk: &ChunkRef) -> (u32, usize, usize) {
    (chunk.chapter_idx, chunk.start, chunk.end)
}

/// Merge two hit sets by `(chapterIdx, startPos, endPos)`, keeping the
/// higher similarity for duplicate locations.
fn merge_by_location(a: Vec<ScoredChunk>, b: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut by_location: HashMap<(u32, usize, usize), ScoredChunk> = HashMap::new();
    for hit in a.into_iter().chain(b) {
        by_location
            .entry(location_key(&hit.chunk))
            .and_modify(|existing| {
                if hit.similarity > existing.similarity {
                    *existing = hit.clone();
                }
            })
            .or_insert(hit);
    }
    by_location.into_values().collect()
}

/// Collapse pairs with Jaccard word-overlap `>= 0.85`, keeping the one
/// with higher similarity.
fn semantic_dedup(mut hits: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

    let mut kept: Vec<ScoredChunk> = Vec::with_capacity(hits.len());
    for candidate in hits {
        let is_duplicate = kept
            .iter()
            .any(|k| jaccard_word_overlap(&k.text, &candidate.text) >= SEMANTIC_DEDUP_THRESHOLD);
        if !is_duplicate {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(book: Uuid, idx: u32, start: usize, end: usize, text: &str, sim: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRef { book_id: book, chapter_idx: idx, start, end },
            text: text.to_string(),
            vector: vec![1.0],
            similarity: sim,
        }
    }

    #[test]
    fn expansion_appends_synonyms_on_trigger() {
        let expanded = Retriever::expand_query("give me a summary of chapter one").unwrap();
        assert!(expanded.contains("summarize"));
    }

    #[test]
    fn expansion_is_none_without_trigger() {
        assert!(Retriever::expand_query("what happens next").is_none());
    }

    #[test]
    fn merge_keeps_higher_similarity_per_location() {
        let book = Uuid::new_v4();
        let a = vec![hit(book, 0, 0, 10, "x", 0.5)];
        let b = vec![hit(book, 0, 0, 10, "x", 0.9)];
        let merged = merge_by_location(a, b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].similarity, 0.9);
    }

    #[test]
    fn dedup_collapses_near_identical_text() {
        let book = Uuid::new_v4();
        let hits = vec![
            hit(book, 0, 0, 10, "the quick brown fox jumps", 0.9),
            hit(book, 1, 0, 10, "the quick brown fox jumps over", 0.8),
            hit(book, 2, 0, 10, "completely unrelated content here", 0.7),
        ];
        let kept = semantic_dedup(hits);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].similarity, 0.9);
    }
}
