//! Metadata extraction for captured exchanges.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::llm::{BackendRequest, extract_json_from_response};
use regex::{Regex, RegexBuilder};
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Maximum title length in characters.
pub const MAX_TITLE_CHARS: usize = 50;

/// Maximum summary length in characters.
pub const MAX_SUMMARY_CHARS: usize = 100;

/// Maximum number of keywords kept.
pub const MAX_KEYWORDS: usize = 3;

/// Title used when the backend gives none.
pub const DEFAULT_TITLE: &str = "Untitled";

/// Category used when the backend gives none.
pub const DEFAULT_CATEGORY: &str = "general";

/// Creativity for the extraction call.
const EXTRACTION_CREATIVITY: f64 = 0.3;

/// First-person and model-identity tokens. English entries match whole
/// words; Korean entries match anywhere.
const SELF_REFERENCE_WORDS: &[&str] = &["as an ai", "i am", "i'm", "assistant", "ai"];
const SELF_REFERENCE_FRAGMENTS: &[&str] = &["제가", "저는", "저희는"];

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static regex: whitespace"));

static BASE_SCRUB: LazyLock<Regex> = LazyLock::new(|| {
    build_scrub_pattern(&[]).expect("static regex: self references")
});

const EXTRACTION_INSTRUCTIONS: &str = "\
Extract curation metadata from the exchange below.

Rules:
1. Remove every self-reference: first-person phrases and any assistant or model name.
2. Keep only objective facts in the third person.
3. No speculation without grounds.
4. Write \"unclear\" when unsure.";

/// Metadata attached to a captured artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactMetadata {
    /// Short title.
    pub title: String,
    /// Up to three keywords.
    pub keywords: Vec<String>,
    /// Topic category.
    pub category: String,
    /// Short summary.
    pub summary: String,
}

impl Default for ArtifactMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            keywords: Vec::new(),
            category: DEFAULT_CATEGORY.to_string(),
            summary: String::new(),
        }
    }
}

/// JSON schema of the extraction reply.
#[must_use]
pub fn metadata_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": {"type": "string", "description": "Core point in at most 50 characters"},
            "keywords": {"type": "array", "items": {"type": "string"}, "maxItems": 3},
            "category": {"type": "string", "description": "Topic category"},
            "summary": {"type": "string", "description": "Core content in at most 100 characters"}
        },
        "required": ["title", "keywords", "category", "summary"]
    })
}

/// Builds the constrained extraction request for one exchange.
#[must_use]
pub fn extraction_request(utterance: &str, reply: &str) -> BackendRequest {
    BackendRequest::new(
        EXTRACTION_INSTRUCTIONS,
        format!("User: {utterance}\nAssistant: {reply}"),
    )
    .with_creativity(EXTRACTION_CREATIVITY)
    .with_schema(metadata_schema())
}

fn build_scrub_pattern(display_names: &[String]) -> Result<Regex, regex::Error> {
    let words = SELF_REFERENCE_WORDS
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|");
    let mut fragments: Vec<String> = SELF_REFERENCE_FRAGMENTS
        .iter()
        .map(|f| regex::escape(f))
        .collect();
    let mut names: Vec<&String> = display_names.iter().filter(|n| !n.trim().is_empty()).collect();
    // Longest first so "Gemini Flash" wins over "Gemini".
    names.sort_by_key(|n| std::cmp::Reverse(n.chars().count()));
    fragments.extend(names.into_iter().map(|n| regex::escape(n)));

    RegexBuilder::new(&format!(
        r"(?:\b(?:{words})\b|{})",
        fragments.join("|")
    ))
    .case_insensitive(true)
    .build()
}

/// Removes self-references and backend display names, then collapses
/// whitespace.
#[must_use]
pub fn scrub_self_references(text: &str, display_names: &[String]) -> String {
    let scrubbed = if display_names.is_empty() {
        BASE_SCRUB.replace_all(text, "")
    } else {
        match build_scrub_pattern(display_names) {
            Ok(pattern) => std::borrow::Cow::Owned(pattern.replace_all(text, "").into_owned()),
            Err(e) => {
                tracing::warn!(error = %e, "Display-name scrub pattern failed, using base pattern");
                BASE_SCRUB.replace_all(text, "")
            },
        }
    };
    WHITESPACE.replace_all(&scrubbed, " ").trim().to_string()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn string_field(object: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Parses an extraction reply, filling defaults for anything missing.
///
/// Title and summary are scrubbed and then truncated by characters; a title
/// scrubbed to nothing falls back to the default.
#[must_use]
pub fn parse_metadata(raw: &str, display_names: &[String]) -> ArtifactMetadata {
    let parsed: Option<serde_json::Map<String, Value>> =
        serde_json::from_str::<Value>(extract_json_from_response(raw))
            .ok()
            .and_then(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            });
    let Some(object) = parsed else {
        tracing::debug!("Metadata reply was not a JSON object, using defaults");
        return ArtifactMetadata::default();
    };

    let title = string_field(&object, "title")
        .map(|t| scrub_self_references(&t, display_names))
        .filter(|t| !t.is_empty())
        .map_or_else(|| DEFAULT_TITLE.to_string(), |t| truncate_chars(&t, MAX_TITLE_CHARS));
    let summary = string_field(&object, "summary")
        .map(|s| truncate_chars(&scrub_self_references(&s, display_names), MAX_SUMMARY_CHARS))
        .unwrap_or_default();
    let keywords = object
        .get("keywords")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .take(MAX_KEYWORDS)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    let category =
        string_field(&object, "category").unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    ArtifactMetadata {
        title,
        keywords,
        category,
        summary,
    }
}
