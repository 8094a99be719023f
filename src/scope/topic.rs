//! A single topic scope.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::intent::IntentVocabulary;
use crate::models::Stage;
use crate::storage::Document;
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static SCOPE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_]+$").expect("static regex: scope id"));

/// Validates a scope id against `^[a-z_]+$`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for any other id.
pub fn validate_scope_id(id: &str) -> Result<()> {
    if SCOPE_ID.is_match(id) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "scope id must match ^[a-z_]+$: {id:?}"
        )))
    }
}

/// The constitution given to scopes created at runtime.
#[must_use]
pub fn generic_constitution(display_name: &str) -> String {
    format!(
        "You are the dedicated assistant for the '{display_name}' topic.\n\
         \n\
         [Essentials]\n\
         - Analyse from the user's own source material first.\n\
         - Use the topic knowledge in depth.\n\
         - Be concrete: examples, principles, methods.\n\
         \n\
         [Conversation]\n\
         - Speak to the user directly and naturally.\n\
         \n\
         [Avoid]\n\
         - Generalities, bold markdown, copying an earlier answer."
    )
}

/// Collection names for each curation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageNames {
    /// Collection holding captured material.
    pub source: String,
    /// Collection holding drafts.
    pub draft: String,
    /// Collection holding published material.
    #[serde(rename = "final")]
    pub published: String,
}

impl Default for StageNames {
    fn default() -> Self {
        Self {
            source: "raw".to_string(),
            draft: "draft".to_string(),
            published: "final".to_string(),
        }
    }
}

/// A named subject domain with its own instructions, aliases, and categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScope {
    /// Identifier (`^[a-z_]+$`).
    pub id: String,
    /// Human-facing name.
    pub display_name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Instruction template handed to the backend.
    #[serde(default)]
    pub constitution: String,
    /// English key to stored field name.
    #[serde(default)]
    pub field_aliases: BTreeMap<String, String>,
    /// Collection name per stage.
    #[serde(default)]
    pub stage_names: StageNames,
    /// Category vocabulary used by intent classification.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl TopicScope {
    /// Creates a scope with the generic constitution.
    ///
    /// An empty description becomes `"<display name> topic"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the id is malformed or the display
    /// name is blank.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        validate_scope_id(&id)?;
        let display_name = display_name.into();
        if display_name.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "scope '{id}' needs a display name"
            )));
        }
        let mut description = description.into();
        if description.trim().is_empty() {
            description = format!("{display_name} topic");
        }

        Ok(Self {
            constitution: generic_constitution(&display_name),
            id,
            display_name,
            description,
            field_aliases: BTreeMap::new(),
            stage_names: StageNames::default(),
            categories: Vec::new(),
        })
    }

    /// Replaces the constitution.
    #[must_use]
    pub fn with_constitution(mut self, constitution: impl Into<String>) -> Self {
        self.constitution = constitution.into();
        self
    }

    /// Sets the category vocabulary.
    #[must_use]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Maps an English field key to a stored field name.
    #[must_use]
    pub fn with_field_alias(mut self, key: impl Into<String>, field: impl Into<String>) -> Self {
        self.field_aliases.insert(key.into(), field.into());
        self
    }

    /// Resolves an English field key; unmapped keys resolve to themselves.
    #[must_use]
    pub fn field_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.field_aliases.get(key).map_or(key, String::as_str)
    }

    /// Collection name for a stage.
    #[must_use]
    pub fn stage_name(&self, stage: Stage) -> &str {
        match stage {
            Stage::Source => &self.stage_names.source,
            Stage::Draft => &self.stage_names.draft,
            Stage::Final => &self.stage_names.published,
        }
    }

    /// Category vocabulary for intent classification.
    #[must_use]
    pub fn vocabulary(&self) -> IntentVocabulary {
        IntentVocabulary::new(&self.categories)
    }

    /// Encodes the scope as a registry document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_document(&self) -> Result<Document> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::OperationFailed {
                operation: "serialize_scope".to_string(),
                cause: "scope did not serialize to an object".to_string(),
            }),
            Err(e) => Err(Error::OperationFailed {
                operation: "serialize_scope".to_string(),
                cause: e.to_string(),
            }),
        }
    }

    /// Decodes a registry document, revalidating the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid scope.
    pub fn from_document(document: &Document) -> Result<Self> {
        let mut scope: Self = serde_json::from_value(Value::Object(document.clone())).map_err(
            |e| Error::OperationFailed {
                operation: "deserialize_scope".to_string(),
                cause: e.to_string(),
            },
        )?;
        validate_scope_id(&scope.id)?;
        if scope.constitution.trim().is_empty() {
            scope.constitution = generic_constitution(&scope.display_name);
        }
        Ok(scope)
    }
}
