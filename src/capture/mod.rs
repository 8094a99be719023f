//! Quality-gated capture.
//!
//! Exchanges inside a topic scope pass through four steps before they reach
//! the source stage:
//!
//! 1. [`check_gate`]: hard filter on empty replies, error echoes, and bare
//!    acknowledgements
//! 2. [`parse_metadata`]: title, keywords, category, and summary from a
//!    constrained backend call, scrubbed of self-references
//! 3. [`score_exchange`]: heuristic score that flags artifacts for review
//! 4. persistence, done by [`CaptureService`](crate::services::CaptureService)
//!
//! Everything here is pure; the service owns the I/O.

mod gate;
mod metadata;
mod scoring;

pub use gate::{
    ACKNOWLEDGEMENTS, GateRejection, MIN_REPLY_CONTENT_CHARS, check_gate, is_acknowledgement,
};
pub use metadata::{
    ArtifactMetadata, DEFAULT_CATEGORY, DEFAULT_TITLE, MAX_KEYWORDS, MAX_SUMMARY_CHARS,
    MAX_TITLE_CHARS, extraction_request, metadata_schema, parse_metadata, scrub_self_references,
};
pub use scoring::{
    CONNECTIVES, GENERIC_PHRASES, QualityReport, REVIEW_THRESHOLD, generic_phrase_hits,
    score_exchange, utterance_keywords,
};
