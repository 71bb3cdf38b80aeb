//! Prompt Assembler (§4.7): composes system and user prompts from
//! selected chunks and optional selection text.

use crate::retrieval::mmr::RankedChunk;

const CONCISE_SYSTEM_CAP: usize = 500;

/// Which register the assembled prompt should read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    Concise,
    Verbose,
}

#[derive(Debug, Clone)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    pub max_user_prompt_chars: usize,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self { max_user_prompt_chars: 8000 }
    }
}

impl PromptAssembler {
    #[must_use]
    pub fn assemble(
        &self,
        variant: PromptVariant,
        query: &str,
        selection: Option<&str>,
        chunks: &[RankedChunk],
    ) -> AssembledPrompt {
        let system_prompt = self.system_prompt(variant);

        let mut user_prompt = String::new();
        if let Some(selection) = selection {
            user_prompt.push_str("Selected passage:\n");
            user_prompt.push_str(selection);
            user_prompt.push_str("\n\n");
        }

        for (i, ranked) in chunks.iter().enumerate() {
            user_prompt.push_str(&format_chunk(i + 1, ranked));
            user_prompt.push('\n');
        }

        user_prompt.push_str("\nQuestion: ");
        user_prompt.push_str(query);

        user_prompt.truncate(self.max_user_prompt_chars);

        AssembledPrompt { system_prompt, user_prompt }
    }

    fn system_prompt(&self, variant: PromptVariant) -> String {
        let mut prompt = match variant {
            PromptVariant::Concise => {
                "You are a reading companion. Answer briefly, grounded only in the provided context.".to_string()
            }
            PromptVariant::Verbose => {
                "You are a reading companion helping a reader understand a book they are partway \
                 through. Use only the provided context and the reader's selection. Explain your \
                 reasoning where helpful, cite the chapter a claim comes from, and say plainly when \
                 the context doesn't contain an answer."
                    .to_string()
            }
        };
        if variant == PromptVariant::Concise {
            prompt.truncate(CONCISE_SYSTEM_CAP);
        }
        prompt
    }
}

fn format_chunk(n: usize, ranked: &RankedChunk) -> String {
    format!(
        "[Context {n}] (Chapter {}, relevance: {:.2}, diversity: {:.2}): {}",
        ranked.chunk.chunk.chapter_idx, ranked.relevance, ranked.diversity, ranked.chunk.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::index::ScoredChunk;
    use crate::types::ChunkRef;
    use uuid::Uuid;

    fn ranked(idx: u32, text: &str) -> RankedChunk {
        RankedChunk {
            chunk: ScoredChunk {
                chunk: ChunkRef { book_id: Uuid::new_v4(), chapter_idx: idx, start: 0, end: text.len() },
                text: text.to_string(),
                vector: vec![1.0],
                similarity: 0.9,
            },
            relevance: 0.9,
            diversity: 0.5,
            context_importance: 0.3,
        }
    }

    #[test]
    fn concise_system_prompt_respects_cap() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.assemble(PromptVariant::Concise, "why?", None, &[]);
        assert!(prompt.system_prompt.len() <= CONCISE_SYSTEM_CAP);
    }

    #[test]
    fn chunks_are_formatted_with_context_markers() {
        let assembler = PromptAssembler::default();
        let chunks = vec![ranked(2, "the dragon appeared")];
        let prompt = assembler.assemble(PromptVariant::Verbose, "what happened", None, &chunks);
        assert!(prompt.user_prompt.contains("[Context 1]"));
        assert!(prompt.user_prompt.contains("Chapter 2"));
        assert!(prompt.user_prompt.contains("the dragon appeared"));
    }

    #[test]
    fn selection_is_inlined_before_chunks() {
        let assembler = PromptAssembler::default();
        let prompt = assembler.assemble(PromptVariant::Verbose, "what?", Some("a quoted line"), &[]);
        assert!(prompt.user_prompt.contains("a quoted line"));
    }
}
