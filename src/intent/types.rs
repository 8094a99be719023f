//! Types for intent classification.
//!
//! - [`IntentKind`]: the five outcomes of the priority cascade
//! - [`IntentParameters`]: typed parameters per outcome
//! - [`ClassificationResult`]: the complete classification

use crate::models::Stage;
use serde::Serialize;
use std::fmt;

/// What an utterance asks the system to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentKind {
    /// Store the last response in the managed store.
    Save,
    /// Retrieve documents from the managed store.
    Read,
    /// Modify stored documents (requires approval).
    Update,
    /// Remove stored documents (requires approval).
    Delete,
    /// Open-ended exchange; never touches the store.
    #[default]
    Organize,
}

impl IntentKind {
    /// Returns the string representation used in serialization.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Save => "SAVE",
            Self::Read => "READ",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Organize => "ORGANIZE",
        }
    }

    /// Whether the intent would change the managed store.
    #[must_use]
    pub const fn is_mutation(&self) -> bool {
        matches!(self, Self::Save | Self::Update | Self::Delete)
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a SAVE stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveTarget {
    /// The most recent backend response.
    LastResponse,
}

/// Parameters attached to a classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum IntentParameters {
    /// SAVE parameters.
    Save {
        /// Destination stage.
        collection: Stage,
        /// What to store.
        target: SaveTarget,
    },
    /// UPDATE and DELETE parameters.
    Approval {
        /// Always `true`: mutations are proposed, never executed directly.
        requires_approval: bool,
    },
    /// READ parameters.
    Read {
        /// Stages named in the utterance, in canonical order.
        collections: Vec<Stage>,
        /// First topic category named in the utterance.
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    /// No parameters (ORGANIZE).
    Empty {},
}

impl IntentParameters {
    /// The SAVE destination, if any.
    #[must_use]
    pub const fn collection(&self) -> Option<Stage> {
        match self {
            Self::Save { collection, .. } => Some(*collection),
            _ => None,
        }
    }

    /// Whether execution must wait for an explicit approval.
    #[must_use]
    pub const fn requires_approval(&self) -> bool {
        matches!(
            self,
            Self::Approval {
                requires_approval: true
            }
        )
    }

    /// Whether there are no parameters.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty {})
    }
}

/// Result of classifying one utterance. Computed fresh, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// The matched intent.
    pub kind: IntentKind,
    /// Fixed per rule; not a statistical estimate.
    pub confidence: f32,
    /// Typed parameters for the intent.
    pub parameters: IntentParameters,
}

impl ClassificationResult {
    /// Confidence assigned by every rule of the cascade.
    pub const RULE_CONFIDENCE: f32 = 0.95;

    pub(crate) const fn new(kind: IntentKind, parameters: IntentParameters) -> Self {
        Self {
            kind,
            confidence: Self::RULE_CONFIDENCE,
            parameters,
        }
    }

    /// The default ORGANIZE result.
    #[must_use]
    pub const fn organize() -> Self {
        Self::new(IntentKind::Organize, IntentParameters::Empty {})
    }
}
