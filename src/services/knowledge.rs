//! Topic knowledge snippets.

use crate::models::Stage;
use crate::scope::TopicScope;
use crate::storage::{DocumentStore, StoredDocument};

/// Snippet returned when a scope has no documents at all.
pub const EMPTY_KNOWLEDGE: &str = "No topic knowledge has been recorded yet.";

/// Documents read per stage by default.
pub const DEFAULT_KNOWLEDGE_LIMIT: usize = 100;

/// Characters kept from previews.
pub const PREVIEW_CHARS: usize = 300;

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

fn field<'a>(scope: &TopicScope, document: &'a StoredDocument, key: &str) -> &'a str {
    document.str_field(scope.field_name(key)).unwrap_or_default()
}

fn content<'a>(scope: &TopicScope, document: &'a StoredDocument) -> &'a str {
    let content = field(scope, document, "content");
    if content.is_empty() {
        field(scope, document, "full_text")
    } else {
        content
    }
}

fn title<'a>(scope: &TopicScope, document: &'a StoredDocument) -> &'a str {
    let title = field(scope, document, "title");
    if title.is_empty() { "N/A" } else { title }
}

fn render_source(scope: &TopicScope, document: &StoredDocument) -> String {
    format!(
        "[SOURCE] {}\nOriginal input:\n{}\n\nPrevious reply:\n{}\n\nCurated content:\n{}",
        title(scope, document),
        field(scope, document, "source_utterance"),
        preview(field(scope, document, "raw_response")),
        content(scope, document),
    )
}

fn render_curated(scope: &TopicScope, stage: Stage, document: &StoredDocument) -> String {
    format!(
        "[{}] {}: {}",
        stage.as_str().to_uppercase(),
        title(scope, document),
        preview(content(scope, document)),
    )
}

/// Renders a scope's stored documents as one knowledge snippet.
///
/// Stages are read source, then draft, then final, up to `limit` documents
/// each. A store failure is logged and yields an empty snippet; a store with
/// no documents yields [`EMPTY_KNOWLEDGE`].
#[must_use]
pub fn build_knowledge_snippet(
    store: &dyn DocumentStore,
    scope: &TopicScope,
    limit: usize,
) -> String {
    let mut parts = Vec::new();
    for stage in Stage::ALL {
        let documents = match store.list(&scope.id, scope.stage_name(stage), limit) {
            Ok(documents) => documents,
            Err(e) => {
                tracing::warn!(scope = %scope.id, stage = %stage, error = %e, "Failed to read topic knowledge");
                return String::new();
            },
        };
        parts.extend(documents.iter().map(|document| match stage {
            Stage::Source => render_source(scope, document),
            Stage::Draft | Stage::Final => render_curated(scope, stage, document),
        }));
    }

    if parts.is_empty() {
        return EMPTY_KNOWLEDGE.to_string();
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Document, MemoryDocumentStore};
    use crate::{Error, Result};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn scope() -> TopicScope {
        TopicScope::new("balance_training", "Balance", "")
            .unwrap()
            .with_field_alias("title", "제목")
    }

    #[test]
    fn test_empty_store_yields_fixed_text() {
        let store = MemoryDocumentStore::new();
        assert_eq!(
            build_knowledge_snippet(&store, &scope(), DEFAULT_KNOWLEDGE_LIMIT),
            EMPTY_KNOWLEDGE
        );
    }

    #[test]
    fn test_stages_render_in_priority_order_with_aliases() {
        let store = MemoryDocumentStore::new();
        store
            .set(
                "balance_training",
                "final",
                "f1",
                &doc(json!({"제목": "Heel reset", "content": "Land on the heel."})),
            )
            .unwrap();
        store
            .set(
                "balance_training",
                "draft",
                "d1",
                &doc(json!({"제목": "Breathing", "full_text": "Exhale slowly."})),
            )
            .unwrap();
        store
            .set(
                "balance_training",
                "raw",
                "r1",
                &doc(json!({
                    "제목": "Gait question",
                    "source_utterance": "why does my hip drop?",
                    "raw_response": "x".repeat(400),
                    "content": "Hip drop comes from a weak stance leg.",
                })),
            )
            .unwrap();

        let snippet = build_knowledge_snippet(&store, &scope(), 10);
        let source = snippet.find("[SOURCE] Gait question").unwrap();
        let draft = snippet.find("[DRAFT] Breathing: Exhale slowly.").unwrap();
        let published = snippet.find("[FINAL] Heel reset: Land on the heel.").unwrap();
        assert!(source < draft && draft < published);
        assert!(snippet.contains("why does my hip drop?"));
        assert!(snippet.contains(&format!("{}...", "x".repeat(300))));
        assert!(!snippet.contains(&"x".repeat(301)));
    }

    #[test]
    fn test_limit_applies_per_stage() {
        let store = MemoryDocumentStore::new();
        for i in 0..5 {
            store
                .set("balance_training", "draft", &format!("d{i}"), &doc(json!({"제목": format!("t{i}")})))
                .unwrap();
        }
        let snippet = build_knowledge_snippet(&store, &scope(), 2);
        assert_eq!(snippet.matches("[DRAFT]").count(), 2);
    }

    struct BrokenStore;

    impl DocumentStore for BrokenStore {
        fn get(&self, _: &str, _: &str, _: &str) -> Result<Option<Document>> {
            Ok(None)
        }
        fn set(&self, _: &str, _: &str, _: &str, _: &Document) -> Result<()> {
            Ok(())
        }
        fn delete(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            Ok(false)
        }
        fn append(&self, _: &str, _: &str, _: &str, _: &Document) -> Result<()> {
            Ok(())
        }
        fn list(&self, _: &str, _: &str, _: usize) -> Result<Vec<StoredDocument>> {
            Err(Error::OperationFailed {
                operation: "list_documents".to_string(),
                cause: "disk unavailable".to_string(),
            })
        }
    }

    #[test]
    fn test_store_failure_yields_empty_snippet() {
        assert_eq!(build_knowledge_snippet(&BrokenStore, &scope(), 10), "");
    }
}
