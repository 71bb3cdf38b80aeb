//! Context Budget Manager (§4.6): turns a query and a retrieval result
//! into a concrete token budget and, when warranted, reduces the
//! candidate chunk set to fit it.

use crate::budget::complexity::analyze;
use crate::config::{BudgetConfig, BudgetStrategy};
use crate::embeddings::similarity::jaccard_word_overlap;
use crate::retrieval::index::ScoredChunk;
use crate::retrieval::mmr;
use crate::types::{Budget, QueryComplexity};

/// Reduction percentages and quality floor for one strategy (§4.6 step 2).
#[derive(Debug, Clone, Copy)]
struct StrategyProfile {
    context_reduction: f32,
    response_reduction: f32,
    quality_floor: f32,
    threshold_filter: Option<f32>,
}

fn profile_for(strategy: BudgetStrategy) -> StrategyProfile {
    match strategy {
        BudgetStrategy::Aggressive => StrategyProfile {
            context_reduction: 0.40,
            response_reduction: 0.35,
            quality_floor: 0.75,
            threshold_filter: Some(0.8),
        },
        BudgetStrategy::Balanced => StrategyProfile {
            context_reduction: 0.25,
            response_reduction: 0.20,
            quality_floor: 0.80,
            threshold_filter: Some(0.75),
        },
        BudgetStrategy::Conservative => StrategyProfile {
            context_reduction: 0.15,
            response_reduction: 0.10,
            quality_floor: 0.85,
            threshold_filter: None,
        },
        BudgetStrategy::Adaptive => unreachable!("resolved before profile lookup"),
    }
}

/// Resolve `adaptive` to a concrete strategy based on complexity (§4.6
/// step 2).
fn resolve_strategy(strategy: BudgetStrategy, complexity: &QueryComplexity, aggressive_toggle: bool) -> BudgetStrategy {
    match strategy {
        BudgetStrategy::Adaptive => match complexity.category {
            crate::types::ComplexityCategory::Simple => {
                if aggressive_toggle {
                    BudgetStrategy::Aggressive
                } else {
                    BudgetStrategy::Balanced
                }
            }
            crate::types::ComplexityCategory::Moderate => BudgetStrategy::Balanced,
            crate::types::ComplexityCategory::Complex => BudgetStrategy::Conservative,
        },
        other => other,
    }
}

/// Recommended action after computing budget and quality impact (§4.6
/// step 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    Skip,
    Apply,
    Monitor,
}

/// Full output of a budget decision: the computed budget, recommendation,
/// and bookkeeping needed to explain the decision.
#[derive(Debug, Clone)]
pub struct BudgetDecision {
    pub complexity: QueryComplexity,
    pub resolved_strategy: BudgetStrategy,
    pub budget: Budget,
    pub recommendation: Recommendation,
    pub quality_impact: f32,
    pub context_reduction_ratio: f32,
    pub response_reduction_ratio: f32,
}

pub struct BudgetManager {
    config: BudgetConfig,
}

impl BudgetManager {
    #[must_use]
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    /// Run the full per-request pipeline (§4.6 steps 1-6), given an
    /// estimate of whether this request would hit the cache.
    #[must_use]
    pub fn decide(&self, query: &str, cache_hit_probability: f32) -> BudgetDecision {
        let complexity = analyze(query);
        let resolved = resolve_strategy(
            self.config.default_strategy,
            &complexity,
            self.config.adaptive_aggressive_toggle,
        );
        let profile = profile_for(resolved);

        let base_context = self.config.max_context_tokens as f32;
        let base_response = self.config.max_response_tokens as f32;

        let context_after_strategy = base_context * (1.0 - profile.context_reduction);
        let response_after_strategy = base_response * (1.0 - profile.response_reduction);

        let cache_bias = 0.2;
        let context_cache_reduction = cache_bias * cache_hit_probability * 0.2;
        let response_cache_reduction = context_cache_reduction / 2.0;

        let context_tokens = context_after_strategy * (1.0 - context_cache_reduction);
        let response_tokens = response_after_strategy * (1.0 - response_cache_reduction);

        let budget = Budget::clamped(context_tokens as usize, response_tokens as usize, 1.0);

        let context_reduction_ratio = 1.0 - (budget.context_tokens as f32 / base_context);
        let response_reduction_ratio = 1.0 - (budget.response_tokens as f32 / base_response);
        let complexity_factor = 1.0 + 0.5 * complexity.score;
        let quality_impact = (0.6 * context_reduction_ratio * complexity_factor
            + 0.4 * response_reduction_ratio * complexity_factor)
            .clamp(0.0, 1.0);

        let savings = (context_reduction_ratio + response_reduction_ratio) / 2.0;
        let recommendation = if quality_impact > 1.0 - profile.quality_floor {
            Recommendation::Skip
        } else if savings >= 0.15 && quality_impact < 0.05 {
            Recommendation::Apply
        } else {
            Recommendation::Monitor
        };

        BudgetDecision {
            complexity,
            resolved_strategy: resolved,
            budget,
            recommendation,
            quality_impact,
            context_reduction_ratio,
            response_reduction_ratio,
        }
    }

    /// Heuristic cache-hit-probability estimate (§4.6 step 3). Callers
    /// that already know the answer (an L1/L2 hit exists) should pass
    /// `1.0` directly instead of calling this.
    #[must_use]
    pub fn estimate_cache_hit_probability(recent_hit_rate: f32, query: &str) -> f32 {
        const COMMON_PREFIXES: &[&str] = &["what is", "who is", "summarize", "define"];
        let lower = query.to_lowercase();
        let bonus = if COMMON_PREFIXES.iter().any(|p| lower.starts_with(p)) { 0.1 } else { 0.0 };
        (recent_hit_rate + bonus).clamp(0.0, 1.0)
    }

    /// Coordinated reduction over reranked chunks (§4.6, last paragraph):
    /// threshold filter, semantic dedup, MMR (if candidate count > 5),
    /// then smart truncation to the context budget.
    #[must_use]
    pub fn reduce_chunks(
        &self,
        decision: &BudgetDecision,
        candidates: Vec<ScoredChunk>,
        query: &str,
    ) -> Vec<ScoredChunk> {
        let profile = profile_for(decision.resolved_strategy);

        let mut filtered = match profile.threshold_filter {
            Some(threshold) => candidates.into_iter().filter(|c| c.similarity >= threshold).collect(),
            None => candidates,
        };

        filtered = dedup(filtered);

        let reranked = if filtered.len() > 5 {
            let k_final = filtered.len().min(mmr::DEFAULT_K_FINAL.max(5));
            mmr::select(filtered, query, mmr::DEFAULT_LAMBDA, k_final)
                .into_iter()
                .map(|r| r.chunk)
                .collect()
        } else {
            filtered
        };

        smart_truncate(reranked, decision.budget.context_tokens)
    }
}

fn dedup(mut chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    chunks.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<ScoredChunk> = Vec::with_capacity(chunks.len());
    for candidate in chunks {
        let is_dup = kept.iter().any(|k| jaccard_word_overlap(&k.text, &candidate.text) >= 0.85);
        if !is_dup {
            kept.push(candidate);
        }
    }
    kept
}

fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(4)
}

/// Sort by `similarity * relevance * contextImportance` (here approximated
/// as `similarity^2`, since relevance is similarity pre-MMR) and greedily
/// admit chunks under the token budget; truncate or drop the final
/// partial chunk per the 100-char rule.
fn smart_truncate(mut chunks: Vec<ScoredChunk>, context_tokens: usize) -> Vec<ScoredChunk> {
    chunks.sort_by(|a, b| {
        let score_a = a.similarity * a.similarity;
        let score_b = b.similarity * b.similarity;
        score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut admitted = Vec::new();
    let mut used_tokens = 0usize;

    for mut chunk in chunks {
        let chunk_tokens = estimate_tokens(chunk.text.len());
        if used_tokens + chunk_tokens <= context_tokens {
            used_tokens += chunk_tokens;
            admitted.push(chunk);
            continue;
        }

        let remaining_tokens = context_tokens.saturating_sub(used_tokens);
        let remaining_chars = remaining_tokens * 4;
        if remaining_chars >= 100 {
            chunk.text.truncate(remaining_chars);
            chunk.chunk.end = chunk.chunk.start + chunk.text.len();
            admitted.push(chunk);
        }
        break;
    }

    admitted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChunkRef;
    use uuid::Uuid;

    fn chunk(text: &str, sim: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: ChunkRef { book_id: Uuid::new_v4(), chapter_idx: 0, start: 0, end: text.len() },
            text: text.to_string(),
            vector: vec![1.0],
            similarity: sim,
        }
    }

    #[test]
    fn budget_respects_floor_even_under_aggressive_strategy() {
        let manager = BudgetManager::new(BudgetConfig {
            default_strategy: BudgetStrategy::Aggressive,
            ..Default::default()
        });
        let decision = manager.decide("what is this", 1.0);
        assert!(decision.budget.context_tokens >= Budget::MIN_CONTEXT_TOKENS);
        assert!(decision.budget.response_tokens >= Budget::MIN_RESPONSE_TOKENS);
    }

    #[test]
    fn adaptive_picks_conservative_for_complex_queries() {
        let manager = BudgetManager::new(BudgetConfig::default());
        let complex_query = "Analyze and evaluate, however obscure, why Gandalf, Frodo, and Aragorn differ? Compare? Contrast?";
        let decision = manager.decide(complex_query, 0.0);
        assert_eq!(decision.resolved_strategy, BudgetStrategy::Conservative);
    }

    #[test]
    fn smart_truncation_keeps_chunks_within_budget() {
        let chunks = vec![chunk(&"word ".repeat(200), 0.9), chunk(&"word ".repeat(200), 0.8)];
        let truncated = smart_truncate(chunks, 100);
        let total_tokens: usize = truncated.iter().map(|c| estimate_tokens(c.text.len())).sum();
        assert!(total_tokens <= 100);
    }

    #[test]
    fn smart_truncation_drops_tiny_tail_fragment() {
        let chunks = vec![chunk(&"word ".repeat(30), 0.9)];
        let truncated = smart_truncate(chunks, 1);
        assert!(truncated.is_empty() || truncated[0].text.len() >= 100);
    }
}
