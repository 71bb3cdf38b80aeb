//! Embeddings and their concept clusters (§3, §4.10).

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A fixed-dimensional embedding owned by a book and, optionally, a user.
/// An absent `user_id` means the embedding is eligible for anonymous
/// sharing (§4.10).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Embedding {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Option<Uuid>,
    pub concept_fingerprint: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_access: DateTime<Utc>,
}

impl Embedding {
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }

    /// Record an access, bumping the counter and timestamp. Call on every
    /// read path that contributes to hotness/predictive scoring.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count += 1;
        self.last_access = now;
    }
}

/// Running centroid for a concept fingerprint, used to offer anonymized
/// cross-user matches (§4.10).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConceptCluster {
    pub fingerprint: String,
    pub centroid: Vec<f32>,
    pub member_count: u64,
    /// Anonymized representative text, proper nouns/years/numbers replaced
    /// with placeholders, capped at 300 chars.
    pub representative_text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConceptCluster {
    /// Seed a new single-member cluster.
    #[must_use]
    pub fn seed(fingerprint: String, vector: Vec<f32>, representative_text: String, now: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            centroid: vector,
            member_count: 1,
            representative_text,
            created_at: now,
            updated_at: now,
        }
    }

    /// Incrementally update the centroid to remain the arithmetic mean of
    /// all member vectors, without retaining the members themselves.
    ///
    /// `new_mean = old_mean + (x - old_mean) / (n + 1)`
    pub fn incorporate(&mut self, vector: &[f32], now: DateTime<Utc>) {
        debug_assert_eq!(vector.len(), self.centroid.len());
        let n = self.member_count as f32;
        for (c, x) in self.centroid.iter_mut().zip(vector.iter()) {
            *c += (x - *c) / (n + 1.0);
        }
        self.member_count += 1;
        self.updated_at = now;
    }
}
