//! Query complexity analysis (§4.6 step 1): a cheap, regex-free heuristic
//! scorer over the raw query text.

use crate::types::{ComplexityCategory, QueryComplexity};

const ANALYTICAL_VERBS: &[&str] = &[
    "analyze", "compare", "contrast", "evaluate", "explain", "justify", "interpret", "critique",
];

const ANALYTICAL_CONNECTIVES: &[&str] = &[
    "however", "therefore", "although", "consequently", "furthermore", "nevertheless",
];

/// Score a query per §4.6: `0.2*L/500 + 0.2*K/10 + 0.2*E/5 + 0.2*Q/3 + 0.2*A/5`,
/// clamped to `[0, 1]`.
#[must_use]
pub fn analyze(query: &str) -> QueryComplexity {
    let length_chars = query.len();
    let lower = query.to_lowercase();

    let analytical_verbs = ANALYTICAL_VERBS.iter().filter(|v| lower.contains(*v)).count();
    let analytical_connectives = ANALYTICAL_CONNECTIVES.iter().filter(|c| lower.contains(*c)).count();
    let question_marks = query.matches('?').count();
    let proper_nouns = count_proper_nouns(query);

    let score = (0.2 * (length_chars as f32 / 500.0)
        + 0.2 * (analytical_verbs as f32 / 10.0)
        + 0.2 * (proper_nouns as f32 / 5.0)
        + 0.2 * (question_marks as f32 / 3.0)
        + 0.2 * (analytical_connectives as f32 / 5.0))
        .clamp(0.0, 1.0);

    QueryComplexity {
        score,
        category: ComplexityCategory::from_score(score),
        length_chars,
        analytical_verbs,
        proper_nouns,
        question_marks,
        analytical_connectives,
    }
}

/// Count capitalized words that aren't sentence-initial, as a cheap
/// proper-noun proxy.
fn count_proper_nouns(query: &str) -> usize {
    let mut count = 0;
    let mut sentence_start = true;
    for word in query.split_whitespace() {
        let trimmed: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if !trimmed.is_empty() {
            let starts_upper = trimmed.chars().next().is_some_and(char::is_uppercase);
            if starts_upper && !sentence_start {
                count += 1;
            }
            sentence_start = false;
        }
        if word.ends_with(['.', '?', '!']) {
            sentence_start = true;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_plain_query_is_simple() {
        let c = analyze("what is this");
        assert_eq!(c.category, crate::types::ComplexityCategory::Simple);
    }

    #[test]
    fn analytical_verbs_raise_the_score() {
        let plain = analyze("tell me about the plot");
        let analytical = analyze("analyze and evaluate the plot's themes, however obscure");
        assert!(analytical.score > plain.score);
    }

    #[test]
    fn question_marks_are_counted() {
        let c = analyze("why? how? when?");
        assert_eq!(c.question_marks, 3);
    }

    #[test]
    fn mid_sentence_capitals_count_as_proper_nouns() {
        let c = analyze("what does Gandalf think of Frodo");
        assert_eq!(c.proper_nouns, 2);
    }
}
