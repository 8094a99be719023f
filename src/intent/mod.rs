//! Intent classification.
//!
//! Decides whether an utterance is an explicit command against the managed
//! document store or an open-ended exchange. Classification is rule-based,
//! pure, and total; it never fails and never touches the store.
//!
//! # Intent Kinds
//!
//! | Kind | Parameters | Executed by the pipeline |
//! |------|------------|--------------------------|
//! | SAVE | `collection`, `target` | No, surfaced to the caller |
//! | READ | `collections`, `category` | No, surfaced to the caller |
//! | UPDATE | `requires_approval` | Never without approval |
//! | DELETE | `requires_approval` | Never without approval |
//! | ORGANIZE | none | Handled as a normal exchange |
//!
//! # Example
//!
//! ```rust
//! use jnext::intent::{IntentKind, classify};
//!
//! let result = classify("save this to the final collection");
//! assert_eq!(result.kind, IntentKind::Save);
//!
//! let result = classify("if I save this will it sync");
//! assert_eq!(result.kind, IntentKind::Organize);
//! ```

mod classifier;
mod patterns;
mod types;

pub use classifier::{IntentVocabulary, classify, classify_with, normalize};
pub use types::{ClassificationResult, IntentKind, IntentParameters, SaveTarget};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_classify_is_total_and_deterministic(text in "\\PC{0,120}") {
            let first = classify(&text);
            let second = classify(&text);
            prop_assert_eq!(&first, &second);
            prop_assert!((0.0..=1.0).contains(&first.confidence));
        }

        #[test]
        fn prop_whitespace_does_not_change_intent(text in "[a-z ]{0,60}") {
            let padded = format!("  {}\t\n", text.replace(' ', "   "));
            prop_assert_eq!(classify(&text).kind, classify(&padded).kind);
        }

        #[test]
        fn prop_exclusion_suppresses_save(prefix in "[a-z]{0,8}") {
            let plain = format!("{prefix} save this to the db");
            let excluded = format!("{prefix} if i save this to the db will it sync");
            prop_assert_ne!(classify(&excluded).kind, IntentKind::Save);
            prop_assert_eq!(classify(&plain).kind, IntentKind::Save);
        }
    }
}
