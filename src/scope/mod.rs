//! Topic scopes.
//!
//! A topic scope is a named subject domain: its own constitution, stored
//! field names, stage collections, and category vocabulary. Scopes are plain
//! data; behavior that depends on a scope lives in free functions elsewhere
//! and takes a `&TopicScope`.

mod registry;
mod topic;

pub use registry::{REGISTRY_SCOPE, REGISTRY_STAGE, ScopeRegistry};
pub use topic::{StageNames, TopicScope, generic_constitution, validate_scope_id};
