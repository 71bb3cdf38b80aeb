//! Prompt Assembler (§4.7).

pub mod assembler;

pub use assembler::{AssembledPrompt, PromptAssembler, PromptVariant};
