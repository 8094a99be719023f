//! Lexical token sets for intent classification.
//!
//! Each set combines English words, matched on ASCII word boundaries so that
//! mixed-script text such as `db에` still matches, with Korean fragments
//! matched as plain substrings. Patterns run against normalized (lower-cased,
//! whitespace-collapsed) text.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use crate::models::Stage;
use regex::Regex;
use std::sync::LazyLock;

/// A named set of tokens compiled into one pattern.
#[derive(Debug)]
pub struct Lexicon {
    /// Compiled alternation.
    pattern: Regex,
    /// Human-readable name of the set, reported when it matches.
    pub name: &'static str,
}

impl Lexicon {
    fn new(name: &'static str, words: &[&str], fragments: &[&str]) -> Self {
        let mut alternatives = Vec::with_capacity(2);
        if !words.is_empty() {
            let joined = words
                .iter()
                .map(|w| regex::escape(w))
                .collect::<Vec<_>>()
                .join("|");
            alternatives.push(format!("(?:^|[^a-z0-9_])(?:{joined})(?:[^a-z0-9_]|$)"));
        }
        if !fragments.is_empty() {
            let joined = fragments
                .iter()
                .map(|f| regex::escape(f))
                .collect::<Vec<_>>()
                .join("|");
            alternatives.push(format!("(?:{joined})"));
        }
        let pattern = Regex::new(&alternatives.join("|")).expect("static regex: lexicon");
        Self { pattern, name }
    }

    /// Whether any token of the set occurs in normalized text.
    #[must_use]
    pub fn matches(&self, normalized: &str) -> bool {
        let hit = self.pattern.is_match(normalized);
        if hit {
            tracing::trace!(lexicon = self.name, "Lexicon matched");
        }
        hit
    }
}

/// Tokens that name the managed store itself.
pub static STORE_OBJECT_MARKERS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "store object marker",
        &["db", "database", "collection", "knowledge base"],
        &["디비", "데이터베이스", "컬렉션"],
    )
});

/// Imperative store verbs.
pub static SAVE_VERBS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "save verb",
        &["save", "record", "keep", "store"],
        &["저장해", "기록해", "보관해"],
    )
});

/// Continuations that turn a store verb into a description.
pub static SAVE_EXCLUSIONS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "save exclusion",
        &[
            "and then",
            "even if",
            "if i save",
            "if we save",
            "if you save",
            "once saved",
            "after saving",
            "before saving",
            "will it",
            "would it",
        ],
        &["저장해서", "저장해도", "저장하고", "저장하면"],
    )
});

/// Tokens selecting the final collection for a SAVE.
pub static FINAL_MARKERS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "final marker",
        &["final", "complete", "completed", "finished"],
        &["최종", "완료"],
    )
});

/// Imperative delete verbs.
pub static DELETE_VERBS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "delete verb",
        &["delete", "remove", "erase"],
        &["삭제해", "지워", "제거해"],
    )
});

/// Continuations that turn a delete verb into a description.
pub static DELETE_EXCLUSIONS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "delete exclusion",
        &[
            "and then",
            "even if",
            "if i delete",
            "if we delete",
            "if you delete",
            "once deleted",
            "after deleting",
            "before deleting",
            "will it",
            "would it",
        ],
        &["삭제해서", "삭제하고", "삭제하면"],
    )
});

/// Imperative modify verbs.
pub static UPDATE_VERBS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "update verb",
        &["update", "modify", "edit", "change", "fix", "revise"],
        &["수정해", "고쳐", "바꿔", "변경해"],
    )
});

/// Continuations and preview phrasing that must not mutate the store.
pub static UPDATE_EXCLUSIONS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "update exclusion",
        &[
            "and then",
            "even if",
            "if i update",
            "if we update",
            "if you update",
            "show me",
            "let me see",
            "preview",
            "merge",
            "combine",
            "will it",
            "would it",
        ],
        &["수정해서", "수정해도", "수정하고", "수정하면", "보여줘", "보여주", "통합"],
    )
});

/// Retrieval verbs.
pub static READ_VERBS: LazyLock<Lexicon> = LazyLock::new(|| {
    Lexicon::new(
        "read verb",
        &[
            "search", "find", "fetch", "retrieve", "look up", "show", "list", "get",
        ],
        &["검색해", "찾아줘", "가져와", "조회해", "보여줘", "보여주"],
    )
});

/// Stage names and their aliases.
pub static STAGE_NAMES: LazyLock<Vec<(Stage, Lexicon)>> = LazyLock::new(|| {
    vec![
        (
            Stage::Source,
            Lexicon::new("source stage", &["source", "sources", "raw"], &["원본"]),
        ),
        (
            Stage::Draft,
            Lexicon::new("draft stage", &["draft", "drafts"], &["초안"]),
        ),
        (
            Stage::Final,
            Lexicon::new("final stage", &["final", "finals"], &["최종"]),
        ),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sets_are_named() {
        assert_eq!(SAVE_VERBS.name, "save verb");
        assert_eq!(STORE_OBJECT_MARKERS.name, "store object marker");
        assert!(STAGE_NAMES.iter().all(|(_, lexicon)| lexicon.name.ends_with("stage")));
    }

    #[test]
    fn test_words_respect_ascii_boundaries() {
        assert!(STORE_OBJECT_MARKERS.matches("put it in the db"));
        assert!(STORE_OBJECT_MARKERS.matches("db에 저장해"));
        assert!(!STORE_OBJECT_MARKERS.matches("feedback loop"));
        assert!(!SAVE_VERBS.matches("they saved it yesterday"));
    }

    #[test]
    fn test_fragments_match_inside_words() {
        assert!(SAVE_VERBS.matches("디비에 저장해줘"));
        assert!(SAVE_EXCLUSIONS.matches("저장해서 보여줘"));
    }

    #[test]
    fn test_multi_word_tokens() {
        assert!(READ_VERBS.matches("look up the walking drafts"));
        assert!(UPDATE_EXCLUSIONS.matches("show me a revision"));
        assert!(SAVE_EXCLUSIONS.matches("if i save this will it sync"));
    }

    #[test]
    fn test_stage_aliases() {
        let source = &STAGE_NAMES[0];
        assert_eq!(source.0, Stage::Source);
        assert!(source.1.matches("the raw entries"));
        assert!(source.1.matches("원본 자료"));
    }
}
