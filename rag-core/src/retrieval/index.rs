//! Vector Index (§4.4): an in-memory map from chunk to embedding, scanned
//! linearly for cosine similarity. No ANN structure — the working set is
//! a single book's chapters, not a corpus-scale index.

use std::collections::HashMap;

use uuid::Uuid;

use crate::embeddings::similarity::cosine_similarity;
use crate::error::{Error, Result};
use crate::types::ChunkRef;

/// One indexed chunk: its source location, the text it was embedded from,
/// and the embedding itself.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub chunk: ChunkRef,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A scored hit returned from [`VectorIndex::search`].
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: ChunkRef,
    pub text: String,
    pub vector: Vec<f32>,
    pub similarity: f32,
}

/// In-memory per-book vector index. Populated from persisted chapter
/// embeddings at startup and kept current as new chapters are ingested.
pub struct VectorIndex {
    dimension: usize,
    by_book: HashMap<Uuid, Vec<IndexedChunk>>,
}

impl VectorIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            by_book: HashMap::new(),
        }
    }

    /// Insert or replace an embedded chunk. Fails with `DimensionMismatch`
    /// if `vector` doesn't match the index's configured dimension.
    pub fn insert(&mut self, chunk: ChunkRef, text: String, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.by_book
            .entry(chunk.book_id)
            .or_default()
            .push(IndexedChunk { chunk, text, vector });
        Ok(())
    }

    /// Top-K chunks by cosine similarity for `book_id`, optionally
    /// restricted to a single `chapter_idx`, above `threshold`.
    pub fn search(
        &self,
        book_id: Uuid,
        chapter_idx: Option<u32>,
        query_vector: &[f32],
        threshold: f32,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if query_vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let Some(chunks) = self.by_book.get(&book_id) else {
            return Ok(Vec::new());
        };

        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| chapter_idx.is_none_or(|idx| c.chunk.chapter_idx == idx))
            .map(|c| ScoredChunk {
                chunk: c.chunk,
                text: c.text.clone(),
                vector: c.vector.clone(),
                similarity: cosine_similarity(query_vector, &c.vector),
            })
            .filter(|c| c.similarity >= threshold)
            .collect();

        scored.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    pub fn len(&self, book_id: Uuid) -> usize {
        self.by_book.get(&book_id).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self, book_id: Uuid) -> bool {
        self.len(book_id) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(book: Uuid, idx: u32, start: usize, end: usize) -> ChunkRef {
        ChunkRef {
            book_id: book,
            chapter_idx: idx,
            start,
            end,
        }
    }

    #[test]
    fn dimension_mismatch_on_insert_is_rejected() {
        let mut index = VectorIndex::new(3);
        let book = Uuid::new_v4();
        let err = index.insert(chunk(book, 0, 0, 10), "a".into(), vec![1.0, 2.0]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn search_filters_by_threshold_and_book() {
        let mut index = VectorIndex::new(2);
        let book_a = Uuid::new_v4();
        let book_b = Uuid::new_v4();
        index.insert(chunk(book_a, 0, 0, 10), "near".into(), vec![1.0, 0.0]).unwrap();
        index.insert(chunk(book_a, 1, 0, 10), "far".into(), vec![0.0, 1.0]).unwrap();
        index.insert(chunk(book_b, 0, 0, 10), "other book".into(), vec![1.0, 0.0]).unwrap();

        let hits = index.search(book_a, None, &[1.0, 0.0], 0.9, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "near");
    }

    #[test]
    fn search_respects_chapter_filter() {
        let mut index = VectorIndex::new(2);
        let book = Uuid::new_v4();
        index.insert(chunk(book, 0, 0, 10), "ch0".into(), vec![1.0, 0.0]).unwrap();
        index.insert(chunk(book, 1, 0, 10), "ch1".into(), vec![1.0, 0.0]).unwrap();

        let hits = index.search(book, Some(1), &[1.0, 0.0], 0.0, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "ch1");
    }

    #[test]
    fn search_truncates_to_top_k() {
        let mut index = VectorIndex::new(1);
        let book = Uuid::new_v4();
        for i in 0..5u32 {
            index.insert(chunk(book, i, 0, 10), format!("c{i}"), vec![1.0]).unwrap();
        }
        let hits = index.search(book, None, &[1.0], 0.0, 2).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
