//! In-memory stores.
//!
//! Used as defaults when no data directory is configured, and in tests.

use super::sqlite::acquire_lock;
use super::traits::{
    ConversationLog, Document, DocumentStore, StoredDocument, duplicate_error, validate_key,
};
use crate::models::{ExchangeId, Role, Utterance};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug)]
struct LoggedTurn {
    utterance: Utterance,
    metadata: Document,
    capture_location: Option<String>,
}

/// Conversation log held in memory.
#[derive(Debug, Default)]
pub struct MemoryConversationLog {
    turns: Mutex<Vec<LoggedTurn>>,
}

impl MemoryConversationLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged turns.
    #[must_use]
    pub fn len(&self) -> usize {
        acquire_lock(&self.turns).len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the metadata recorded with a turn.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the exchange does not exist.
    pub fn metadata(&self, id: &ExchangeId) -> Result<Document> {
        let index = Self::index_of(id)?;
        acquire_lock(&self.turns)
            .get(index)
            .map(|turn| turn.metadata.clone())
            .ok_or_else(|| Error::NotFound(format!("exchange '{id}'")))
    }

    /// Ids are 1-based positions.
    fn index_of(id: &ExchangeId) -> Result<usize> {
        id.as_str()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .ok_or_else(|| Error::NotFound(format!("exchange '{id}'")))
    }
}

impl ConversationLog for MemoryConversationLog {
    fn append(&self, role: Role, text: &str, metadata: &Document) -> Result<ExchangeId> {
        let mut turns = acquire_lock(&self.turns);
        turns.push(LoggedTurn {
            utterance: Utterance::new(role, text),
            metadata: metadata.clone(),
            capture_location: None,
        });
        Ok(ExchangeId::new(turns.len().to_string()))
    }

    fn recent(&self, limit: usize) -> Result<Vec<Utterance>> {
        let turns = acquire_lock(&self.turns);
        let skip = turns.len().saturating_sub(limit);
        Ok(turns[skip..]
            .iter()
            .map(|turn| turn.utterance.clone())
            .collect())
    }

    fn mark_captured(&self, id: &ExchangeId, location: &str) -> Result<()> {
        let index = Self::index_of(id)?;
        let mut turns = acquire_lock(&self.turns);
        let turn = turns
            .get_mut(index)
            .ok_or_else(|| Error::NotFound(format!("exchange '{id}'")))?;
        turn.capture_location = Some(location.to_string());
        Ok(())
    }

    fn is_captured(&self, id: &ExchangeId) -> Result<bool> {
        let index = Self::index_of(id)?;
        acquire_lock(&self.turns)
            .get(index)
            .map(|turn| turn.capture_location.is_some())
            .ok_or_else(|| Error::NotFound(format!("exchange '{id}'")))
    }
}

type DocumentKey = (String, String, String);

/// Document store held in memory.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<DocumentKey, Document>>,
}

impl MemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(scope: &str, stage: &str, id: &str) -> Result<DocumentKey> {
        validate_key("scope", scope)?;
        validate_key("stage", stage)?;
        validate_key("document id", id)?;
        Ok((scope.to_string(), stage.to_string(), id.to_string()))
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn get(&self, scope: &str, stage: &str, id: &str) -> Result<Option<Document>> {
        let key = Self::key(scope, stage, id)?;
        Ok(acquire_lock(&self.documents).get(&key).cloned())
    }

    fn set(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()> {
        let key = Self::key(scope, stage, id)?;
        acquire_lock(&self.documents).insert(key, document.clone());
        Ok(())
    }

    fn delete(&self, scope: &str, stage: &str, id: &str) -> Result<bool> {
        let key = Self::key(scope, stage, id)?;
        Ok(acquire_lock(&self.documents).remove(&key).is_some())
    }

    fn append(&self, scope: &str, stage: &str, id: &str, document: &Document) -> Result<()> {
        let key = Self::key(scope, stage, id)?;
        let mut documents = acquire_lock(&self.documents);
        if documents.contains_key(&key) {
            return Err(duplicate_error(scope, stage, id));
        }
        documents.insert(key, document.clone());
        Ok(())
    }

    fn list(&self, scope: &str, stage: &str, limit: usize) -> Result<Vec<StoredDocument>> {
        validate_key("scope", scope)?;
        validate_key("stage", stage)?;
        let documents = acquire_lock(&self.documents);
        Ok(documents
            .iter()
            .rev()
            .filter(|((s, st, _), _)| s == scope && st == stage)
            .take(limit)
            .map(|((_, _, id), fields)| StoredDocument {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_log_recent_and_capture_flag() {
        let log = MemoryConversationLog::new();
        let mut metadata = Document::new();
        metadata.insert("backend".to_string(), json!("gpt"));
        let first = log.append(Role::User, "q1", &metadata).unwrap();
        log.append(Role::Model, "a1", &Document::new()).unwrap();
        log.append(Role::User, "q2", &Document::new()).unwrap();

        let recent = log.recent(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text(), "a1");
        assert_eq!(log.recent(50).unwrap().len(), 3);

        assert_eq!(log.metadata(&first).unwrap()["backend"], "gpt");
        assert!(!log.is_captured(&first).unwrap());
        log.mark_captured(&first, "scope/raw/1").unwrap();
        assert!(log.is_captured(&first).unwrap());
        assert!(log.is_captured(&ExchangeId::new("0")).is_err());
        assert!(log.is_captured(&ExchangeId::new("4")).is_err());
    }

    #[test]
    fn test_append_refuses_existing_id() {
        let store = MemoryDocumentStore::new();
        store
            .append("balance_training", "raw", "1", &doc(json!({"title": "a"})))
            .unwrap();
        let again = store.append("balance_training", "raw", "1", &doc(json!({"title": "b"})));

        assert!(matches!(again, Err(Error::OperationFailed { .. })));
        let kept = store.get("balance_training", "raw", "1").unwrap().unwrap();
        assert_eq!(kept["title"], "a");
    }

    #[test]
    fn test_update_merges_fields() {
        let store = MemoryDocumentStore::new();
        store
            .set("s", "draft", "1", &doc(json!({"title": "a", "status": "DRAFT"})))
            .unwrap();
        store
            .update("s", "draft", "1", &doc(json!({"status": "FINAL"})))
            .unwrap();

        let merged = store.get("s", "draft", "1").unwrap().unwrap();
        assert_eq!(merged["title"], "a");
        assert_eq!(merged["status"], "FINAL");
        assert!(matches!(
            store.update("s", "draft", "2", &Document::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_is_scoped_newest_first() {
        let store = MemoryDocumentStore::new();
        for id in ["20250101_000000_000001", "20250101_000000_000002"] {
            store.set("a", "raw", id, &Document::new()).unwrap();
        }
        store.set("a", "final", "x", &Document::new()).unwrap();
        store.set("b", "raw", "y", &Document::new()).unwrap();

        let listed = store.list("a", "raw", 10).unwrap();
        let ids: Vec<&str> = listed.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["20250101_000000_000002", "20250101_000000_000001"]);
        assert_eq!(store.list("a", "raw", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_query_by_field_and_delete() {
        let store = MemoryDocumentStore::new();
        store.set("s", "raw", "1", &doc(json!({"category": "gait"}))).unwrap();
        store.set("s", "raw", "2", &doc(json!({"category": "breath"}))).unwrap();

        let hits = store
            .query_by_field("s", "raw", "category", &json!("gait"), 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");

        assert!(store.delete("s", "raw", "1").unwrap());
        assert!(!store.delete("s", "raw", "1").unwrap());
    }

    #[test]
    fn test_unsafe_keys_are_rejected() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.get("../up", "raw", "1"),
            Err(Error::InvalidInput(_))
        ));
    }
}
