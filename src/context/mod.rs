//! Context composition.
//!
//! Turns the recent exchange window, an optional topic-knowledge snippet, and
//! the current utterance into the instructions and the single composite
//! message a backend receives.
//!
//! # Weights
//!
//! | Knowledge focus | Conversation | Knowledge | General |
//! |-----------------|--------------|-----------|---------|
//! | 0 | 100% | 0% | 0% |
//! | 1..=100 | 30% | 70% | 0% |
//!
//! Weights label sections; they never truncate content. A section whose
//! content is empty or whose weight is zero is omitted. The current question
//! is always present.

mod composer;
mod instructions;
mod weights;

pub use composer::{ComposeRequest, ComposedContext, MAX_HISTORY_TURNS, compose_context};
pub use instructions::{
    CONVERSATION_PRIORITY_BLOCK, GENERAL_INSTRUCTIONS, KNOWLEDGE_PRIORITY_BLOCK,
    build_instructions,
};
pub use weights::{
    ContextWeights, MAX_KNOWLEDGE_FOCUS, inverse_creativity_curve, resolve_weights,
};
