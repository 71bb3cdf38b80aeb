//! Knowledge Enhancer (§4.8): produces a structured JSON artifact for
//! `enhance`-intent requests instead of free-form prose.

use serde::{Deserialize, Serialize};

use crate::retrieval::mmr::RankedChunk;
use crate::types::QualityMetrics;

const MAX_CONCEPTS: usize = 5;
const MAX_HISTORICAL: usize = 3;
const MAX_CULTURAL: usize = 3;
const MAX_CONNECTIONS: usize = 4;
const QUALITY_FLOOR: f32 = 0.7;

/// Which bucket a selection's enhancement falls into, chosen by a small
/// keyword table over the selection text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementKind {
    Concept,
    Historical,
    Cultural,
    General,
}

const CONCEPT_KEYWORDS: &[&str] = &["theory", "principle", "concept", "philosophy", "idea"];
const HISTORICAL_KEYWORDS: &[&str] = &["war", "king", "empire", "century", "era", "revolution"];
const CULTURAL_KEYWORDS: &[&str] = &["tradition", "custom", "ritual", "festival", "folklore", "myth"];

#[must_use]
pub fn classify(selection: &str) -> EnhancementKind {
    let lower = selection.to_lowercase();
    if CONCEPT_KEYWORDS.iter().any(|k| lower.contains(k)) {
        EnhancementKind::Concept
    } else if HISTORICAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        EnhancementKind::Historical
    } else if CULTURAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
        EnhancementKind::Cultural
    } else {
        EnhancementKind::General
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptItem {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalItem {
    pub event: String,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CulturalItem {
    pub reference: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionItem {
    pub description: String,
}

/// The structured artifact returned for `enhance` requests, capped per
/// §4.8 and validated before being handed back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnhancementArtifact {
    #[serde(default)]
    pub concepts: Vec<ConceptItem>,
    #[serde(default)]
    pub historical: Vec<HistoricalItem>,
    #[serde(default)]
    pub cultural: Vec<CulturalItem>,
    #[serde(default)]
    pub connections: Vec<ConnectionItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    TooManyItems { field: &'static str, cap: usize, actual: usize },
    MissingField { field: &'static str, index: usize },
}

/// Enforce the per-category caps; an artifact failing this must not be
/// returned to the caller.
pub fn validate(artifact: &EnhancementArtifact) -> Result<(), ValidationError> {
    check_cap("concepts", artifact.concepts.len(), MAX_CONCEPTS)?;
    check_cap("historical", artifact.historical.len(), MAX_HISTORICAL)?;
    check_cap("cultural", artifact.cultural.len(), MAX_CULTURAL)?;
    check_cap("connections", artifact.connections.len(), MAX_CONNECTIONS)?;

    for (i, item) in artifact.concepts.iter().enumerate() {
        if item.term.trim().is_empty() || item.definition.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "concepts", index: i });
        }
    }
    for (i, item) in artifact.historical.iter().enumerate() {
        if item.event.trim().is_empty() || item.context.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "historical", index: i });
        }
    }
    for (i, item) in artifact.cultural.iter().enumerate() {
        if item.reference.trim().is_empty() || item.explanation.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "cultural", index: i });
        }
    }
    for (i, item) in artifact.connections.iter().enumerate() {
        if item.description.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "connections", index: i });
        }
    }
    Ok(())
}

fn check_cap(field: &'static str, actual: usize, cap: usize) -> Result<(), ValidationError> {
    if actual > cap {
        Err(ValidationError::TooManyItems { field, cap, actual })
    } else {
        Ok(())
    }
}

/// Compute the four quality metrics for an artifact (§4.8).
///
/// `selection` is the source text the artifact was generated from, used
/// for the relevance (keyword overlap) measure.
#[must_use]
pub fn quality_of(artifact: &EnhancementArtifact, selection: &str) -> QualityMetrics {
    let accuracy_baseline = 0.8;
    let item_count = artifact.concepts.len() + artifact.historical.len() + artifact.cultural.len();
    let structure_bonus = if item_count > 0 { 0.1 } else { -0.2 };
    let accuracy = (accuracy_baseline + structure_bonus).clamp(0.0, 1.0);

    let relevance = relevance_by_keyword_overlap(artifact, selection);

    let max_items = MAX_CONCEPTS + MAX_HISTORICAL + MAX_CULTURAL;
    let completeness = (item_count as f32 / max_items as f32).clamp(0.0, 1.0);

    let clarity = clarity_by_definition_length(artifact);

    QualityMetrics { relevance, diversity: accuracy, completeness, coherence: clarity }
}

fn relevance_by_keyword_overlap(artifact: &EnhancementArtifact, selection: &str) -> f32 {
    let selection_words: std::collections::HashSet<String> = selection
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if selection_words.is_empty() {
        return 0.0;
    }

    let mut all_terms = Vec::new();
    all_terms.extend(artifact.concepts.iter().map(|c| c.term.clone()));
    all_terms.extend(artifact.historical.iter().map(|h| h.event.clone()));
    all_terms.extend(artifact.cultural.iter().map(|c| c.reference.clone()));

    if all_terms.is_empty() {
        return 0.0;
    }

    let matches = all_terms
        .iter()
        .filter(|term| selection_words.contains(&term.to_lowercase()))
        .count();
    matches as f32 / all_terms.len() as f32
}

fn clarity_by_definition_length(artifact: &EnhancementArtifact) -> f32 {
    let lengths: Vec<usize> = artifact.concepts.iter().map(|c| c.definition.split_whitespace().count()).collect();
    if lengths.is_empty() {
        return 0.5;
    }
    let avg = lengths.iter().sum::<usize>() as f32 / lengths.len() as f32;
    // Sweet spot: 8-25 words per definition.
    if (8.0..=25.0).contains(&avg) {
        1.0
    } else if avg < 8.0 {
        (avg / 8.0).clamp(0.0, 1.0)
    } else {
        (25.0 / avg).clamp(0.0, 1.0)
    }
}

/// `true` if the artifact's overall quality falls below the floor and a
/// fallback regeneration should be attempted.
#[must_use]
pub fn needs_fallback(metrics: &QualityMetrics) -> bool {
    metrics.overall() < QUALITY_FLOOR
}

/// System/user prompt pair for an `enhance` request, asking the
/// completion provider for a single JSON object matching
/// [`EnhancementArtifact`]'s shape rather than free-form prose.
#[derive(Debug, Clone)]
pub struct EnhancementPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

fn kind_focus(kind: EnhancementKind) -> &'static str {
    match kind {
        EnhancementKind::Concept => "the philosophical or theoretical concepts",
        EnhancementKind::Historical => "the historical events and period context",
        EnhancementKind::Cultural => "the cultural references, customs or folklore",
        EnhancementKind::General => "any notable background worth surfacing",
    }
}

/// Build the primary enhancement prompt for `selection`, grounded in
/// `chunks` retrieved around it.
#[must_use]
pub fn build_prompt(kind: EnhancementKind, selection: &str, chunks: &[RankedChunk]) -> EnhancementPrompt {
    let system_prompt = format!(
        "You are a reading companion producing a structured knowledge-enhancement artifact. \
         Reply with ONLY a single JSON object of this shape, no prose outside it: \
         {{\"concepts\":[{{\"term\":\"\",\"definition\":\"\"}}],\"historical\":[{{\"event\":\"\",\"context\":\"\"}}],\
         \"cultural\":[{{\"reference\":\"\",\"explanation\":\"\"}}],\"connections\":[{{\"description\":\"\"}}]}}. \
         Favor {focus} relevant to the passage. Omit a category entirely rather than padding it.",
        focus = kind_focus(kind),
    );

    let mut user_prompt = format!("Passage:\n{selection}\n");
    for (i, ranked) in chunks.iter().enumerate() {
        user_prompt.push_str(&format!("\n[Context {}] (Chapter {}): {}", i + 1, ranked.chunk.chunk.chapter_idx, ranked.chunk.text));
    }

    EnhancementPrompt { system_prompt, user_prompt }
}

/// A deliberately smaller prompt used when [`needs_fallback`] rejects the
/// first attempt: asks for a single connection instead of the full shape.
#[must_use]
pub fn build_fallback_prompt(selection: &str) -> EnhancementPrompt {
    EnhancementPrompt {
        system_prompt: "Reply with ONLY this JSON object: \
             {\"concepts\":[],\"historical\":[],\"cultural\":[],\"connections\":[{\"description\":\"\"}]} \
             where the connection names one concrete takeaway from the passage."
            .to_string(),
        user_prompt: format!("Passage:\n{selection}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_keyword() {
        assert_eq!(classify("the theory of relativity"), EnhancementKind::Concept);
        assert_eq!(classify("during the war of 1812"), EnhancementKind::Historical);
        assert_eq!(classify("an old harvest festival tradition"), EnhancementKind::Cultural);
        assert_eq!(classify("he walked into the room"), EnhancementKind::General);
    }

    #[test]
    fn validation_rejects_over_cap_items() {
        let artifact = EnhancementArtifact {
            concepts: (0..6).map(|i| ConceptItem { term: format!("t{i}"), definition: "def".into() }).collect(),
            ..Default::default()
        };
        assert!(matches!(
            validate(&artifact),
            Err(ValidationError::TooManyItems { field: "concepts", .. })
        ));
    }

    #[test]
    fn validation_rejects_missing_fields() {
        let artifact = EnhancementArtifact {
            concepts: vec![ConceptItem { term: String::new(), definition: "def".into() }],
            ..Default::default()
        };
        assert!(validate(&artifact).is_err());
    }

    #[test]
    fn validation_rejects_blank_connection_description() {
        let artifact = EnhancementArtifact {
            connections: vec![ConnectionItem { description: "   ".into() }],
            ..Default::default()
        };
        assert!(matches!(
            validate(&artifact),
            Err(ValidationError::MissingField { field: "connections", .. })
        ));
    }

    #[test]
    fn low_quality_artifact_triggers_fallback() {
        let artifact = EnhancementArtifact::default();
        let metrics = quality_of(&artifact, "some selection text");
        assert!(needs_fallback(&metrics));
    }

    #[test]
    fn prompt_asks_for_json_only_and_includes_selection() {
        let prompt = build_prompt(EnhancementKind::Historical, "the fall of the empire", &[]);
        assert!(prompt.system_prompt.contains("JSON"));
        assert!(prompt.user_prompt.contains("the fall of the empire"));
    }

    #[test]
    fn fallback_prompt_is_smaller_than_primary() {
        let primary = build_prompt(EnhancementKind::General, "a passage", &[]);
        let fallback = build_fallback_prompt("a passage");
        assert!(fallback.system_prompt.len() < primary.system_prompt.len());
    }

    #[test]
    fn well_formed_artifact_can_pass_the_floor() {
        let artifact = EnhancementArtifact {
            concepts: vec![ConceptItem {
                term: "entropy".into(),
                definition: "a measure of disorder in a thermodynamic system over time".into(),
            }],
            historical: vec![HistoricalItem { event: "industrial revolution".into(), context: "context".into() }],
            cultural: vec![],
            connections: vec![],
        };
        let metrics = quality_of(&artifact, "entropy and the industrial revolution changed everything");
        assert!(metrics.overall() > 0.0);
    }
}
