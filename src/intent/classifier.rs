//! Rule-based intent classification.
//!
//! The cascade is evaluated in priority order and the first match wins:
//!
//! | Priority | Intent | Requires | Suppressed by |
//! |----------|--------|----------|---------------|
//! | 1 | SAVE | save verb + store marker | continuation |
//! | 2 | DELETE | delete verb + (store marker or category) | continuation |
//! | 3 | UPDATE | modify verb + store marker | continuation, preview phrasing |
//! | 4 | READ | read verb + (store marker, stage name, or category) | - |
//! | 5 | ORGANIZE | nothing | - |
//!
//! Mutations need an unambiguous lexical marker; when in doubt the utterance
//! falls through to ORGANIZE and the store is left alone.

use super::patterns::{
    DELETE_EXCLUSIONS, DELETE_VERBS, FINAL_MARKERS, READ_VERBS, SAVE_EXCLUSIONS, SAVE_VERBS,
    STAGE_NAMES, STORE_OBJECT_MARKERS, UPDATE_EXCLUSIONS, UPDATE_VERBS,
};
use super::types::{ClassificationResult, IntentKind, IntentParameters, SaveTarget};
use crate::models::Stage;

/// Topic categories the classifier recognizes as store references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentVocabulary {
    /// Categories in priority order, stored normalized.
    categories: Vec<String>,
}

impl IntentVocabulary {
    /// Creates a vocabulary from category names.
    #[must_use]
    pub fn new<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            categories: categories
                .into_iter()
                .map(|c| normalize(c.as_ref()))
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Returns the first category contained in normalized text.
    fn first_category(&self, normalized: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|c| normalized.contains(c.as_str()))
            .map(String::as_str)
    }
}

/// Lower-cases text and collapses whitespace runs to single spaces.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classifies an utterance with no topic categories.
///
/// Pure and total: identical input yields identical output.
#[must_use]
pub fn classify(utterance: &str) -> ClassificationResult {
    classify_with(utterance, &IntentVocabulary::default())
}

/// Classifies an utterance against a topic vocabulary.
#[must_use]
pub fn classify_with(utterance: &str, vocabulary: &IntentVocabulary) -> ClassificationResult {
    let text = normalize(utterance);
    if text.is_empty() {
        return ClassificationResult::organize();
    }

    let has_marker = STORE_OBJECT_MARKERS.matches(&text);
    let category = vocabulary.first_category(&text);

    if has_marker && SAVE_VERBS.matches(&text) && !SAVE_EXCLUSIONS.matches(&text) {
        let collection = if FINAL_MARKERS.matches(&text) {
            Stage::Final
        } else {
            Stage::Draft
        };
        return ClassificationResult::new(
            IntentKind::Save,
            IntentParameters::Save {
                collection,
                target: SaveTarget::LastResponse,
            },
        );
    }

    if (has_marker || category.is_some())
        && DELETE_VERBS.matches(&text)
        && !DELETE_EXCLUSIONS.matches(&text)
    {
        return ClassificationResult::new(
            IntentKind::Delete,
            IntentParameters::Approval {
                requires_approval: true,
            },
        );
    }

    if has_marker && UPDATE_VERBS.matches(&text) && !UPDATE_EXCLUSIONS.matches(&text) {
        return ClassificationResult::new(
            IntentKind::Update,
            IntentParameters::Approval {
                requires_approval: true,
            },
        );
    }

    let collections: Vec<Stage> = STAGE_NAMES
        .iter()
        .filter(|(_, lexicon)| lexicon.matches(&text))
        .map(|(stage, _)| *stage)
        .collect();

    if (has_marker || !collections.is_empty() || category.is_some()) && READ_VERBS.matches(&text)
    {
        return ClassificationResult::new(
            IntentKind::Read,
            IntentParameters::Read {
                collections,
                category: category.map(str::to_string),
            },
        );
    }

    ClassificationResult::organize()
}
