//! # jnext
//!
//! A conversational knowledge pipeline with curated capture.
//!
//! Every request flows through four stages:
//!
//! 1. **Intent classification** ([`intent`]): a rule-based priority cascade decides
//!    whether the utterance is an explicit store command or an open exchange.
//! 2. **Context composition** ([`context`]): conversation history and optional
//!    topic knowledge are weighted and flattened into one composite message.
//! 3. **Backend gateway** ([`llm`]): the message is translated for one of several
//!    text-generation backends and the reply is repaired into a [`StructuredResponse`].
//! 4. **Quality-gated capture** ([`capture`]): exchanges inside a topic scope are
//!    gated, annotated, scored, and appended to the source stage for curation.
//!
//! ## Example
//!
//! ```rust,ignore
//! use jnext::services::{ChatRequest, ChatService};
//! use jnext::llm::CancelToken;
//!
//! let outcome = service.respond(
//!     &ChatRequest::new("what changed since the last draft?")
//!         .with_backend("gemini-flash")
//!         .with_scope("balance_training")
//!         .with_knowledge_focus(40),
//!     &CancelToken::new(),
//! )?;
//! println!("{}", outcome.response.answer);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod capture;
pub mod cli;
pub mod config;
pub mod context;
pub mod intent;
pub mod llm;
pub mod models;
pub mod observability;
pub mod scope;
pub mod services;
pub mod storage;

pub use config::JnextConfig;
pub use context::{ComposedContext, ContextWeights, compose_context};
pub use intent::{ClassificationResult, IntentKind, classify};
pub use llm::{BackendGateway, ChatBackend};
pub use models::{CapturedArtifact, Role, StructuredResponse, Utterance};
pub use scope::{ScopeRegistry, TopicScope};
pub use services::{CaptureService, ChatOutcome, ChatRequest, ChatService};
pub use storage::{ConversationLog, DocumentStore};

/// Error type for jnext operations.
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Empty utterance, out-of-range creativity or focus, malformed scope id |
/// | `OperationFailed` | Backend transport errors, store I/O, `SQLite` failures |
/// | `NotFound` | Unknown backend id, unknown topic scope |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised before the pipeline runs, so callers can surface it as a
    /// request validation failure.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// The `cause` text is what the retry policy inspects for the transient
    /// signature, so backend clients keep HTTP status codes in it.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A referenced backend or scope does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Result type alias for jnext operations.
pub type Result<T> = std::result::Result<T, Error>;
