//! Storage layer.
//!
//! Two opaque collaborators back the pipeline:
//! - **[`ConversationLog`]**: append-only turns with a one-way capture flag
//! - **[`DocumentStore`]**: documents addressed by (scope, stage, id)
//!
//! | Implementation | Trait | Use |
//! |----------------|-------|-----|
//! | [`MemoryConversationLog`] | log | default, tests |
//! | [`SqliteConversationLog`] | log | `data_dir` configured |
//! | [`MemoryDocumentStore`] | documents | default, tests |
//! | [`FilesystemDocumentStore`] | documents | `data_dir` configured |

// Dropping guards a statement early buys nothing here.
#![allow(clippy::significant_drop_tightening)]

mod filesystem;
mod memory;
pub mod sqlite;
mod traits;

pub use filesystem::FilesystemDocumentStore;
pub use memory::{MemoryConversationLog, MemoryDocumentStore};
pub use sqlite::SqliteConversationLog;
pub use traits::{ConversationLog, Document, DocumentStore, StoredDocument, validate_key};

use std::path::PathBuf;

/// Returns the platform data directory for jnext.
///
/// Falls back to `./.jnext` when no home directory can be resolved.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "jnext")
        .map_or_else(|| PathBuf::from(".jnext"), |dirs| dirs.data_dir().to_path_buf())
}
