//! Curation stages of the document store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A curation stage.
///
/// Captured exchanges land in [`Stage::Source`]; curators promote them to
/// [`Stage::Draft`] and [`Stage::Final`]. Each topic scope maps these to its
/// own collection names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw captured material.
    Source,
    /// Work in progress.
    Draft,
    /// Curated, published material.
    Final,
}

impl Stage {
    /// All stages, in knowledge-priority order.
    pub const ALL: [Self; 3] = [Self::Source, Self::Draft, Self::Final];

    /// Returns the canonical stage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Draft => "draft",
            Self::Final => "final",
        }
    }

    /// Parses a stage name, accepting the `raw` alias for [`Stage::Source`].
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "source" | "raw" => Some(Self::Source),
            "draft" => Some(Self::Draft),
            "final" => Some(Self::Final),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
