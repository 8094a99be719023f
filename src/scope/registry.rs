//! The registry of topic scopes.

use super::TopicScope;
use crate::storage::DocumentStore;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Scope under which created topic scopes are persisted.
pub const REGISTRY_SCOPE: &str = "_registry";

/// Stage under which created topic scopes are persisted.
pub const REGISTRY_STAGE: &str = "scopes";

/// Holds every known topic scope.
///
/// Built once at startup and passed by reference; there is no global
/// instance.
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, TopicScope>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a scope, replacing any scope with the same id.
    pub fn register(&mut self, scope: TopicScope) {
        tracing::debug!(scope = %scope.id, display_name = %scope.display_name, "Registered topic scope");
        self.scopes.insert(scope.id.clone(), scope);
    }

    /// Looks up a scope.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&TopicScope> {
        self.scopes.get(id)
    }

    /// Looks up a scope, failing if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn require(&self, id: &str) -> Result<&TopicScope> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("topic scope '{id}'")))
    }

    /// Scope ids mapped to display names, sorted by id.
    #[must_use]
    pub fn list(&self) -> BTreeMap<String, String> {
        self.scopes
            .iter()
            .map(|(id, scope)| (id.clone(), scope.display_name.clone()))
            .collect()
    }

    /// Number of registered scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Whether no scope is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Creates a scope with the generic constitution.
    ///
    /// Idempotent: an existing scope is returned unchanged. New scopes are
    /// persisted to `store` when one is given; a persistence failure is
    /// logged and the scope stays registered in memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id or blank display name.
    pub fn create(
        &mut self,
        id: &str,
        display_name: &str,
        description: &str,
        store: Option<&dyn DocumentStore>,
    ) -> Result<&TopicScope> {
        if self.scopes.contains_key(id) {
            return self.require(id);
        }
        let scope = TopicScope::new(id, display_name, description)?;

        if let Some(store) = store {
            let persisted = scope
                .to_document()
                .and_then(|document| store.set(REGISTRY_SCOPE, REGISTRY_STAGE, id, &document));
            if let Err(e) = persisted {
                tracing::warn!(scope = %id, error = %e, "Failed to persist topic scope");
            }
        }

        tracing::info!(scope = %id, display_name = %display_name, "Created topic scope");
        self.register(scope);
        self.require(id)
    }

    /// Registers every persisted scope not already known.
    ///
    /// Returns how many were loaded. Store failures and malformed documents
    /// are logged and skipped.
    pub fn load_persisted(&mut self, store: &dyn DocumentStore) -> usize {
        let documents = match store.list(REGISTRY_SCOPE, REGISTRY_STAGE, usize::MAX) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted topic scopes");
                return 0;
            },
        };

        let mut loaded = 0;
        for document in documents {
            match TopicScope::from_document(&document.fields) {
                Ok(scope) if !self.scopes.contains_key(&scope.id) => {
                    self.register(scope);
                    loaded += 1;
                },
                Ok(_) => {},
                Err(e) => {
                    tracing::warn!(id = %document.id, error = %e, "Skipping malformed topic scope");
                },
            }
        }
        if loaded > 0 {
            tracing::info!(loaded, "Loaded persisted topic scopes");
        }
        loaded
    }
}
