//! Utterances and conversation roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a turn.
///
/// This is the only role vocabulary inside the crate; backend adapters
/// relabel it at the wire boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The end user.
    #[default]
    User,
    /// A text-generation backend.
    Model,
}

impl Role {
    /// Returns the role as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }

    /// Parses a role from a string.
    ///
    /// Accepts the common backend spellings for the model side.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "user" => Some(Self::User),
            "model" | "assistant" | "ai" => Some(Self::Model),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One natural-language message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    text: String,
    role: Role,
    timestamp: DateTime<Utc>,
}

impl Utterance {
    /// Creates an utterance stamped with the current time.
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self::at(role, text, Utc::now())
    }

    /// Creates an utterance with an explicit timestamp.
    #[must_use]
    pub fn at(role: Role, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            role,
            timestamp,
        }
    }

    /// Shorthand for a user utterance.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Shorthand for a model utterance.
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }

    /// Returns the text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the sender role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Returns the creation time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Identifier of a logged exchange turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    /// Creates a new exchange ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExchangeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
