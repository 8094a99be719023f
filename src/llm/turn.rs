//! The neutral conversation turn handed to backend adapters.

use crate::models::{Role, Utterance};
use serde::{Deserialize, Serialize};

/// A backend-neutral turn.
///
/// Adapters relabel [`Role`] into their wire vocabulary; nothing upstream of
/// an adapter sees `assistant` or `model` strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Who spoke.
    pub role: Role,
    /// What was said.
    pub text: String,
}

impl Turn {
    /// Creates a turn.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

impl From<&Utterance> for Turn {
    fn from(utterance: &Utterance) -> Self {
        Self::new(utterance.role(), utterance.text())
    }
}
