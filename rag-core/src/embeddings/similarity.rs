//! Similarity primitives shared by retrieval (§4.4, §4.5), the semantic
//! cache and the cross-user vector store (§4.10).

use std::collections::HashSet;

/// Cosine similarity between two equal-length vectors, normalized from
/// `[-1, 1]` to `[0, 1]` so every similarity-threshold comparison in the
/// spec can use a single 0..1 scale.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    let cos = dot / (mag_a * mag_b);
    (cos + 1.0) / 2.0
}

/// Jaccard word-overlap ratio between two texts, used for semantic dedup
/// (§4.4) and as the diversity term in MMR (§4.5). Tokens are lowercased
/// and split on non-alphanumeric boundaries; stopwords are not removed
/// here (that happens only in the cache key's semantic key, §4.2).
#[must_use]
pub fn jaccard_word_overlap(a: &str, b: &str) -> f32 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    if words_a.is_empty() && words_b.is_empty() {
        return 1.0;
    }
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f32 / union as f32
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// `1.0 - jaccard_word_overlap`, the diversity term MMR maximizes against
/// already-selected chunks.
#[must_use]
pub fn diversity(a: &str, b: &str) -> f32 {
    1.0 - jaccard_word_overlap(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_are_maximally_similar() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_sit_at_midpoint() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!((cosine_similarity(&a, &b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mismatched_dimensions_yield_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn identical_text_has_full_overlap() {
        let overlap = jaccard_word_overlap("the quick brown fox", "the quick brown fox");
        assert!((overlap - 1.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_text_has_no_overlap() {
        let overlap = jaccard_word_overlap("apples oranges", "trains planes");
        assert_eq!(overlap, 0.0);
    }

    #[test]
    fn diversity_is_complement_of_overlap() {
        let d = diversity("red green blue", "red green blue");
        assert!(d.abs() < 1e-6);
    }
}
