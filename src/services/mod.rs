//! Services that tie the pipeline stages to storage.
//!
//! - [`ChatService`]: the exposed chat call
//! - [`CaptureService`]: capture of scoped exchanges and manual saves
//! - [`build_knowledge_snippet`]: renders a scope's documents for composition

mod capture;
mod chat;
mod knowledge;

pub use capture::{
    CaptureInput, CaptureOutcome, CaptureService, CaptureSummary, SOURCE_STATUS, SkipReason,
};
pub use chat::{ChatOutcome, ChatRequest, ChatService, DEFAULT_BACKEND, DEFAULT_CREATIVITY};
pub use knowledge::{
    DEFAULT_KNOWLEDGE_LIMIT, EMPTY_KNOWLEDGE, PREVIEW_CHARS, build_knowledge_snippet,
};
