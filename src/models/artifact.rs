//! Captured artifacts and their time-ordered identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Format of artifact identifiers: UTC wall clock down to microseconds.
pub const ARTIFACT_ID_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Time-ordered artifact identifier.
///
/// Identifiers are fixed width, so lexicographic order equals creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Wraps an existing identifier.
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

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing [`ArtifactId`]s.
///
/// When the clock has not advanced past the last issued instant the
/// generator bumps by one microsecond instead of repeating an id.
#[derive(Debug, Default)]
pub struct ArtifactIdGenerator {
    last_micros: AtomicI64,
}

impl ArtifactIdGenerator {
    /// Creates a new generator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_micros: AtomicI64::new(i64::MIN),
        }
    }

    /// Issues the next identifier from the system clock.
    pub fn next_id(&self) -> ArtifactId {
        self.next_id_at(Utc::now())
    }

    /// Issues the next identifier as if the clock read `now`.
    pub fn next_id_at(&self, now: DateTime<Utc>) -> ArtifactId {
        let wanted = now.timestamp_micros();
        let mut last = self.last_micros.load(Ordering::Relaxed);
        let issued = loop {
            let candidate = wanted.max(last.saturating_add(1));
            match self.last_micros.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break candidate,
                Err(current) => last = current,
            }
        };
        let instant = DateTime::<Utc>::from_timestamp_micros(issued).unwrap_or(now);
        ArtifactId(instant.format(ARTIFACT_ID_FORMAT).to_string())
    }
}

/// An exchange staged for human curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    /// Time-ordered identifier.
    pub id: ArtifactId,
    /// Topic scope the exchange belongs to.
    pub scope_id: String,
    /// Short title (at most 50 characters).
    pub title: String,
    /// The user's original utterance.
    pub source_utterance: String,
    /// The backend's answer text.
    pub raw_response: String,
    /// Up to three keywords.
    pub keywords: Vec<String>,
    /// Topic category.
    pub category: String,
    /// Short summary (at most 100 characters).
    pub summary: String,
    /// Heuristic quality score in `[0, 100]`.
    pub quality_score: u8,
    /// Human-readable reasons for deductions.
    pub quality_issues: Vec<String>,
    /// Whether a curator should look at this artifact first.
    pub needs_review: bool,
    /// The exchange this artifact was captured from.
    pub exchange_ref: super::ExchangeId,
    /// Backend that produced the answer.
    pub backend_id: String,
    /// Capture time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_id_format() {
        let generator = ArtifactIdGenerator::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let id = generator.next_id_at(at);
        assert_eq!(id.as_str(), "20250309_140507_000000");
    }

    #[test]
    fn test_ids_strictly_increase_when_clock_stalls() {
        let generator = ArtifactIdGenerator::new();
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let first = generator.next_id_at(at);
        let second = generator.next_id_at(at);
        let third = generator.next_id_at(at);
        assert_eq!(second.as_str(), "20250309_140507_000001");
        assert!(first < second && second < third);
    }

    #[test]
    fn test_ids_do_not_go_backwards_with_clock() {
        let generator = ArtifactIdGenerator::new();
        let later = Utc.with_ymd_and_hms(2025, 3, 9, 14, 5, 7).unwrap();
        let earlier = Utc.with_ymd_and_hms(2025, 3, 9, 14, 0, 0).unwrap();
        let first = generator.next_id_at(later);
        let second = generator.next_id_at(earlier);
        assert!(second > first);
    }

    #[test]
    fn test_system_clock_ids_are_ordered() {
        let generator = ArtifactIdGenerator::new();
        let ids: Vec<ArtifactId> = (0..500).map(|_| generator.next_id()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
