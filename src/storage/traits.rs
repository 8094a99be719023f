//! Storage traits.

use crate::models::{ExchangeId, Role, Utterance};
use crate::{Error, Result};
use serde_json::{Map, Value};

/// A stored document: a flat JSON object.
pub type Document = Map<String, Value>;

/// A document together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document id within its scope and stage.
    pub id: String,
    /// Document fields.
    pub fields: Document,
}

impl StoredDocument {
    /// Returns a string field, if present.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Append-only log of conversation turns.
///
/// Turns are never edited; the only mutation is the one-way capture flag.
pub trait ConversationLog: Send + Sync {
    /// Appends a turn and returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn append(&self, role: Role, text: &str, metadata: &Document) -> Result<ExchangeId>;

    /// Returns up to `limit` most recent turns, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn recent(&self, limit: usize) -> Result<Vec<Utterance>>;

    /// Flags an exchange as captured and records where the artifact went.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the exchange does not exist.
    fn mark_captured(&self, id: &ExchangeId, location: &str) -> Result<()>;

    /// Whether an exchange has already been captured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the exchange does not exist.
    fn is_captured(&self, id: &ExchangeId) -> Result<bool>;
}

/// Document store addressed by (scope, stage, id).
///
/// Scope and stage names are opaque to the store.
pub trait DocumentStore: Send + Sync {
    /// Fetches a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, scope: &str, stage: &str, id: &str) -> Result<Option<Document>>;

    /// Writes a document, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()>;

    /// Merges fields into an existing document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the document does not exist.
    fn update(&self, scope: &str, stage: &str, id: &str, fields: &Document) -> Result<()> {
        let mut document = self
            .get(scope, stage, id)?
            .ok_or_else(|| Error::NotFound(format!("document {scope}/{stage}/{id}")))?;
        for (key, value) in fields {
            document.insert(key.clone(), value.clone());
        }
        self.set(scope, stage, id, &document)
    }

    /// Deletes a document. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, scope: &str, stage: &str, id: &str) -> Result<bool>;

    /// Writes a new document, failing if the id is taken.
    ///
    /// # Errors
    ///
    /// Returns `OperationFailed` if a document with this id already exists.
    fn append(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()>;

    /// Lists up to `limit` documents, newest id first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn list(&self, scope: &str, stage: &str, limit: usize) -> Result<Vec<StoredDocument>>;

    /// Lists documents whose `field` equals `value`, newest id first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn query_by_field(
        &self,
        scope: &str,
        stage: &str,
        field: &str,
        value: &Value,
        limit: usize,
    ) -> Result<Vec<StoredDocument>> {
        Ok(self
            .list(scope, stage, usize::MAX)?
            .into_iter()
            .filter(|doc| doc.fields.get(field) == Some(value))
            .take(limit)
            .collect())
    }
}

/// Rejects keys that could escape a directory or collide with separators.
///
/// Only alphanumerics, `-`, and `_` are accepted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty, oversized, or unsafe key.
pub fn validate_key(kind: &str, key: &str) -> Result<()> {
    let safe = !key.is_empty()
        && key.len() <= 255
        && key
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    if safe {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{kind} contains invalid characters: {key:?}"
        )))
    }
}

pub(crate) fn duplicate_error(scope: &str, stage: &str, id: &str) -> Error {
    Error::OperationFailed {
        operation: "append_document".to_string(),
        cause: format!("document {scope}/{stage}/{id} already exists"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("balance_training" ; "underscore")]
    #[test_case("20250309_140507_000001" ; "artifact id")]
    #[test_case("raw" ; "stage")]
    #[test_case("이력" ; "hangul")]
    fn test_validate_key_accepts(key: &str) {
        assert!(validate_key("id", key).is_ok());
    }

    #[test_case("" ; "empty")]
    #[test_case("../etc" ; "traversal")]
    #[test_case("a/b" ; "separator")]
    #[test_case("a b" ; "space")]
    fn test_validate_key_rejects(key: &str) {
        assert!(matches!(validate_key("id", key), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_str_field() {
        let mut fields = Document::new();
        fields.insert("title".to_string(), Value::from("Reset"));
        fields.insert("count".to_string(), Value::from(3));
        let doc = StoredDocument {
            id: "1".to_string(),
            fields,
        };
        assert_eq!(doc.str_field("title"), Some("Reset"));
        assert_eq!(doc.str_field("count"), None);
        assert_eq!(doc.str_field("missing"), None);
    }
}
