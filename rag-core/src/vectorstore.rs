//! Vector Store with Cross-User Sharing (§4.10): the storage and search
//! complement to the RAG retriever, used for semantic response caching
//! across users of the same public book.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::embeddings::similarity::cosine_similarity;
use crate::error::{Error, Result};
use crate::security::pii::contains_pii;
use crate::types::{ConceptCluster, Embedding};

const FIRST_SECOND_PERSON_PRONOUNS: &[&str] = &["i", "my", "me", "you", "your", "yours"];
const MIN_SHAREABLE_WORDS: usize = 10;
const CROSS_USER_THRESHOLD_MULTIPLIER: f32 = 0.9;
const PREDICTIVE_MIN_EMBEDDINGS: usize = 5;
const PREDICTIVE_SCORE_FLOOR: f32 = 0.7;

/// Book-level metadata the store needs to decide anonymous shareability,
/// without depending on the full `Book` entity type.
#[derive(Debug, Clone, Copy)]
pub struct BookShareContext {
    pub public: bool,
}

#[derive(Debug, Clone)]
pub struct FindSimilarOptions {
    pub book_id: Option<Uuid>,
    pub threshold: f32,
    pub allow_cross_user: bool,
}

#[derive(Debug, Clone)]
pub struct SimilarMatch {
    pub embedding: Embedding,
    pub similarity: f32,
    pub is_predictive: bool,
    pub is_anonymous: bool,
}

/// In-memory embedding store, indexed by owning user and by concept
/// fingerprint for cross-user cluster lookups.
#[derive(Default)]
pub struct VectorStore {
    by_user: HashMap<Uuid, Vec<Embedding>>,
    clusters: HashMap<String, ConceptCluster>,
}

impl VectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` if `content` is safe to fold into an anonymous concept
    /// cluster (§4.10 `canShareAnonymously`): the book is public, the
    /// content has at least 10 words, and it contains none of the
    /// first/second-person pronouns as whole words.
    #[must_use]
    pub fn can_share_anonymously(content: &str, book: BookShareContext) -> bool {
        if !book.public {
            return false;
        }
        let words: Vec<&str> = content.split_whitespace().collect();
        if words.len() < MIN_SHAREABLE_WORDS {
            return false;
        }
        let lower = content.to_lowercase();
        let tokens: std::collections::HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        !FIRST_SECOND_PERSON_PRONOUNS.iter().any(|p| tokens.contains(p))
    }

    /// Store an embedding for `user_id`, rejecting content that matches
    /// the PII pattern set. If anonymous sharing applies, the content's
    /// concept cluster is updated by incremental mean.
    pub fn store_embedding(
        &mut self,
        user_id: Uuid,
        book: BookShareContext,
        fingerprint: String,
        vector: Vec<f32>,
        content: String,
        book_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Embedding> {
        if contains_pii(&content) {
            return Err(Error::Validation("content matches a PII pattern".to_string()));
        }

        let anonymous_shareable = Self::can_share_anonymously(&content, book);

        let embedding = Embedding {
            id: Uuid::new_v4(),
            book_id,
            user_id: Some(user_id),
            concept_fingerprint: fingerprint.clone(),
            vector: vector.clone(),
            content: content.clone(),
            created_at: now,
            access_count: 0,
            last_access: now,
        };

        self.by_user.entry(user_id).or_default().push(embedding.clone());

        if anonymous_shareable {
            self.clusters
                .entry(fingerprint.clone())
                .and_modify(|c| c.incorporate(&vector, now))
                .or_insert_with(|| ConceptCluster::seed(fingerprint, vector, content, now));
        }

        Ok(embedding)
    }

    /// Find embeddings similar to `query_vector` (§4.10 `findSimilar`):
    /// first the requester's own embeddings, then — if cross-user
    /// sharing is enabled and requested — anonymized cluster
    /// representatives at a 0.9x threshold.
    #[must_use]
    pub fn find_similar(&self, requester: Uuid, query_vector: &[f32], options: &FindSimilarOptions) -> Vec<SimilarMatch> {
        let mut matches = Vec::new();

        if let Some(own) = self.by_user.get(&requester) {
            for embedding in own {
                if let Some(book_id) = options.book_id {
                    if embedding.book_id != book_id {
                        continue;
                    }
                }
                let similarity = cosine_similarity(query_vector, &embedding.vector);
                if similarity >= options.threshold {
                    matches.push(SimilarMatch { embedding: embedding.clone(), similarity, is_predictive: false, is_anonymous: false });
                }
            }
        }

        if options.allow_cross_user {
            let cross_threshold = options.threshold * CROSS_USER_THRESHOLD_MULTIPLIER;
            for cluster in self.clusters.values() {
                let similarity = cosine_similarity(query_vector, &cluster.centroid);
                if similarity >= cross_threshold {
                    let representative = Embedding {
                        id: Uuid::new_v4(),
                        book_id: options.book_id.unwrap_or_default(),
                        user_id: None,
                        concept_fingerprint: cluster.fingerprint.clone(),
                        vector: cluster.centroid.clone(),
                        content: cluster.representative_text.clone(),
                        created_at: cluster.created_at,
                        access_count: 0,
                        last_access: cluster.updated_at,
                    };
                    matches.push(SimilarMatch { embedding: representative, similarity, is_predictive: false, is_anonymous: true });
                }
            }
        }

        matches
    }

    /// Predictive matches (§4.10): when the requester has at least 5
    /// embeddings with nonzero access counts, score every owned
    /// embedding against a weighted-mean interest centroid plus the
    /// live query, flagging hits at or above 0.7 as predictive.
    #[must_use]
    pub fn predictive_matches(&self, requester: Uuid, query_vector: &[f32], now: DateTime<Utc>) -> Vec<SimilarMatch> {
        let Some(owned) = self.by_user.get(&requester) else { return Vec::new() };
        let accessed: Vec<&Embedding> = owned.iter().filter(|e| e.access_count > 0).collect();
        if accessed.len() < PREDICTIVE_MIN_EMBEDDINGS {
            return Vec::new();
        }

        let dim = accessed[0].vector.len();
        let mut centroid = vec![0.0f32; dim];
        let total_weight: f32 = accessed.iter().map(|e| e.access_count as f32).sum();
        for embedding in &accessed {
            let weight = embedding.access_count as f32 / total_weight.max(1.0);
            for (c, v) in centroid.iter_mut().zip(embedding.vector.iter()) {
                *c += weight * v;
            }
        }

        owned
            .iter()
            .filter_map(|e| {
                let cos_centroid = cosine_similarity(&e.vector, &centroid);
                let time_decay = time_decay(e.last_access, now);
                let access_term = (e.access_count as f32 / 10.0).min(1.0);
                let cos_query = cosine_similarity(&e.vector, query_vector);
                let score = 0.4 * cos_centroid + 0.2 * time_decay + 0.2 * access_term + 0.2 * cos_query;
                if score >= PREDICTIVE_SCORE_FLOOR {
                    Some(SimilarMatch { embedding: e.clone(), similarity: score, is_predictive: true, is_anonymous: false })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Housekeeping sweep (§5): drop embeddings nobody has ever looked up
    /// again once they're older than `max_age`, and drop concept clusters
    /// that never grew past a single contributing embedding. Returns the
    /// number of embeddings removed.
    pub fn evict_stale(&mut self, now: DateTime<Utc>, max_age: chrono::Duration) -> usize {
        let mut removed = 0;
        self.by_user.retain(|_, embeddings| {
            let before = embeddings.len();
            embeddings.retain(|e| e.access_count > 0 || now - e.created_at < max_age);
            removed += before - embeddings.len();
            !embeddings.is_empty()
        });
        self.clusters.retain(|_, cluster| cluster.member_count > 1 || now - cluster.updated_at < max_age);
        removed
    }
}

/// Exponential time decay over days since last access, halving roughly
/// every week.
fn time_decay(last_access: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let days = (now - last_access).num_seconds().max(0) as f32 / 86400.0;
    (-days / 7.0).exp().clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_book_blocks_anonymous_sharing() {
        let content = "this is a sufficiently long sentence about the story plot here";
        assert!(!VectorStore::can_share_anonymously(content, BookShareContext { public: false }));
    }

    #[test]
    fn short_content_blocks_anonymous_sharing() {
        assert!(!VectorStore::can_share_anonymously("too short", BookShareContext { public: true }));
    }

    #[test]
    fn first_person_pronoun_blocks_anonymous_sharing() {
        let content = "I think my favorite part of the whole story was the ending";
        assert!(!VectorStore::can_share_anonymously(content, BookShareContext { public: true }));
    }

    #[test]
    fn clean_public_content_is_shareable() {
        let content = "the protagonist struggles with a difficult decision throughout the chapter";
        assert!(VectorStore::can_share_anonymously(content, BookShareContext { public: true }));
    }

    #[test]
    fn pii_content_is_rejected_on_store() {
        let mut store = VectorStore::new();
        let result = store.store_embedding(
            Uuid::new_v4(),
            BookShareContext { public: true },
            "fp".into(),
            vec![1.0],
            "my ssn is 123-45-6789".into(),
            Uuid::new_v4(),
            Utc::now(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn own_embeddings_are_found_above_threshold() {
        let mut store = VectorStore::new();
        let user = Uuid::new_v4();
        let book = Uuid::new_v4();
        store
            .store_embedding(user, BookShareContext { public: false }, "fp".into(), vec![1.0, 0.0], "short".into(), book, Utc::now())
            .unwrap();
        let options = FindSimilarOptions { book_id: Some(book), threshold: 0.9, allow_cross_user: false };
        let matches = store.find_similar(user, &[1.0, 0.0], &options);
        assert_eq!(matches.len(), 1);
    }
}
