//! Budget, complexity and quality value types (§3, §4.6).

/// Per-request token budget decision.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Budget {
    pub context_tokens: usize,
    pub response_tokens: usize,
    pub confidence: f32,
}

impl Budget {
    pub const MIN_CONTEXT_TOKENS: usize = 500;
    pub const MIN_RESPONSE_TOKENS: usize = 150;

    /// Clamp to the invariant floor in spec §3 ("Budget lower bound", §8.7).
    #[must_use]
    pub fn clamped(context_tokens: usize, response_tokens: usize, confidence: f32) -> Self {
        Self {
            context_tokens: context_tokens.max(Self::MIN_CONTEXT_TOKENS),
            response_tokens: response_tokens.max(Self::MIN_RESPONSE_TOKENS),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Complexity category bucket (§4.6 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityCategory {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityCategory {
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score < 0.33 {
            ComplexityCategory::Simple
        } else if score < 0.67 {
            ComplexityCategory::Moderate
        } else {
            ComplexityCategory::Complex
        }
    }
}

/// Query complexity analysis result with contributing factor counts, kept
/// for observability and for the adaptive strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QueryComplexity {
    pub score: f32,
    pub category: ComplexityCategory,
    pub length_chars: usize,
    pub analytical_verbs: usize,
    pub proper_nouns: usize,
    pub question_marks: usize,
    pub analytical_connectives: usize,
}

/// Aggregate answer-quality metrics, weighted 0.3/0.2/0.3/0.2 into
/// `overall` (§3).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualityMetrics {
    pub relevance: f32,
    pub diversity: f32,
    pub completeness: f32,
    pub coherence: f32,
}

impl QualityMetrics {
    #[must_use]
    pub fn overall(&self) -> f32 {
        0.3 * self.relevance + 0.2 * self.diversity + 0.3 * self.completeness + 0.2 * self.coherence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_never_below_floor() {
        let b = Budget::clamped(10, 5, 2.0);
        assert_eq!(b.context_tokens, Budget::MIN_CONTEXT_TOKENS);
        assert_eq!(b.response_tokens, Budget::MIN_RESPONSE_TOKENS);
        assert_eq!(b.confidence, 1.0);
    }

    #[test]
    fn complexity_category_boundaries() {
        assert_eq!(ComplexityCategory::from_score(0.0), ComplexityCategory::Simple);
        assert_eq!(ComplexityCategory::from_score(0.32), ComplexityCategory::Simple);
        assert_eq!(ComplexityCategory::from_score(0.33), ComplexityCategory::Moderate);
        assert_eq!(ComplexityCategory::from_score(0.66), ComplexityCategory::Moderate);
        assert_eq!(ComplexityCategory::from_score(0.67), ComplexityCategory::Complex);
        assert_eq!(ComplexityCategory::from_score(1.0), ComplexityCategory::Complex);
    }

    #[test]
    fn quality_overall_matches_weights() {
        let q = QualityMetrics {
            relevance: 1.0,
            diversity: 0.0,
            completeness: 1.0,
            coherence: 0.0,
        };
        assert!((q.overall() - 0.6).abs() < 1e-6);
    }
}
