//! MMR Reranker (§4.5): maximal-marginal-relevance selection over
//! retrieved chunks, trading off relevance against diversity from what's
//! already selected.

use std::collections::HashSet;

use crate::embeddings::similarity::jaccard_word_overlap;
use crate::retrieval::index::ScoredChunk;

pub const DEFAULT_LAMBDA: f32 = 0.7;
pub const DEFAULT_K_FINAL: usize = 3;

/// A chunk after MMR selection, stamped with the three metrics the
/// prompt assembler and quality scorer both read.
#[derive(Debug, Clone)]
pub struct RankedChunk {
    pub chunk: ScoredChunk,
    pub relevance: f32,
    pub diversity: f32,
    pub context_importance: f32,
}

/// Greedy MMR selection: seed with the highest-similarity chunk, then
/// repeatedly pick the candidate maximizing `lambda * rel + (1 - lambda)
/// * div` against what's already selected, until `k_final` chunks are
/// chosen or candidates run out.
#[must_use]
pub fn select(candidates: Vec<ScoredChunk>, query: &str, lambda: f32, k_final: usize) -> Vec<RankedChunk> {
    if candidates.is_empty() || k_final == 0 {
        return Vec::new();
    }

    let query_tokens: HashSet<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut remaining = candidates;
    remaining.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));

    let seed = remaining.remove(0);
    let mut selected: Vec<ScoredChunk> = vec![seed];

    while selected.len() < k_final && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::MIN;
        for (i, candidate) in remaining.iter().enumerate() {
            let rel = candidate.similarity;
            let div = selected
                .iter()
                .map(|s| 1.0 - jaccard_word_overlap(&candidate.text, &s.text))
                .fold(f32::MAX, f32::min);
            let score = lambda * rel + (1.0 - lambda) * div;
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }
        selected.push(remaining.remove(best_idx));
    }

    let mut ranked: Vec<RankedChunk> = selected
        .into_iter()
        .map(|chunk| {
            let context_importance = context_importance(&chunk.text, &query_tokens);
            RankedChunk {
                relevance: chunk.similarity,
                diversity: 1.0,
                context_importance,
                chunk,
            }
        })
        .collect();

    // Recompute diversity against the final selected set (excluding self),
    // now that the whole set is known.
    let texts: Vec<String> = ranked.iter().map(|r| r.chunk.text.clone()).collect();
    for (i, r) in ranked.iter_mut().enumerate() {
        r.diversity = texts
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, t)| 1.0 - jaccard_word_overlap(&r.chunk.text, t))
            .fold(1.0, f32::min);
    }

    ranked.sort_by_key(|r| (r.chunk.chunk.chapter_idx, r.chunk.chunk.start));
    ranked
}

fn context_importance(text: &str, query_tokens: &HashSet<String>) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let text_lower = text.to_lowercase();
    let matched = query_tokens.iter().filter(|t| text_lower.contains(t.as_str())).count();
    matched as f32 / query_tokens.len().max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRef;
    use uuid::Uuid;

    fn chunk(idx: u32, start: usize, text: &str, sim: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRef { book_id: Uuid::new_v4(), chapter_idx: idx, start, end: start + text.len() },
            text: text.to_string(),
            vector: vec![1.0],
            similarity: sim,
        }
    }

    #[test]
    fn seeds_with_highest_similarity() {
        let candidates = vec![
            chunk(0, 0, "low similarity text about trains", 0.3),
            chunk(1, 0, "high similarity text about magic", 0.9),
        ];
        let ranked = select(candidates, "magic", DEFAULT_LAMBDA, 2);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().any(|r| r.chunk.similarity == 0.9));
    }

    #[test]
    fn respects_k_final_cap() {
        let candidates = (0..10).map(|i| chunk(i, 0, "unique text", 0.5 + i as f32 * 0.01)).collect();
        let ranked = select(candidates, "query", DEFAULT_LAMBDA, 3);
        assert_eq!(ranked.len(), 3);
    }

    #[test]
    fn results_are_sorted_by_location() {
        let candidates = vec![
            chunk(2, 0, "chapter three content here", 0.8),
            chunk(0, 0, "chapter one content here", 0.7),
            chunk(1, 0, "chapter two content here", 0.9),
        ];
        let ranked = select(candidates, "content", DEFAULT_LAMBDA, 3);
        let indices: Vec<u32> = ranked.iter().map(|r| r.chunk.chunk.chapter_idx).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn context_importance_reflects_query_token_overlap() {
        let candidates = vec![chunk(0, 0, "the magic wand glowed brightly", 0.9)];
        let ranked = select(candidates, "magic wand", DEFAULT_LAMBDA, 1);
        assert!(ranked[0].context_importance > 0.0);
    }
}
