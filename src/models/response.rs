//! The structured response contract shared by every backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Answer used when every backend attempt failed.
pub const DEGRADED_ANSWER: &str = "The response service is temporarily unavailable.";

/// Answer carried by a fan-out envelope.
pub const FAN_OUT_ANSWER: &str = "Multi-backend responses (see per-backend results)";

/// A single piece of supporting evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Evidence {
    /// Where the evidence came from.
    #[serde(default)]
    pub source: String,
    /// Which field of the source.
    #[serde(default)]
    pub field: String,
    /// The cited value.
    #[serde(default)]
    pub value: String,
}

/// Which backend produced a response, and whether it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Provenance {
    /// Backend id as configured (`gemini-flash`, `claude`, `all`, ...).
    pub backend_id: String,
    /// Concrete model identifier reported for the backend.
    pub backend_version: String,
    /// Set when the response was synthesized from a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Provenance {
    /// Creates provenance for a backend and model.
    #[must_use]
    pub fn new(backend_id: impl Into<String>, backend_version: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_version: backend_version.into(),
            error: None,
        }
    }

    /// Marks the provenance as failed.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One entry of a fan-out envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FanOutResult {
    /// The backend answered (possibly with a repaired response).
    Response(StructuredResponse),
    /// The backend failed before producing any text.
    Error {
        /// The failure message.
        error: String,
    },
}

/// The normalized six-field output every backend call satisfies after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredResponse {
    /// The answer text.
    pub answer: String,
    /// Individual claims made in the answer.
    pub claims: Vec<String>,
    /// Evidence backing the claims.
    pub evidence: Vec<Evidence>,
    /// Information the backend reported as missing.
    pub missing_info: Vec<String>,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// Follow-up actions the backend suggests.
    pub actions_suggested: Vec<String>,
    /// Origin of the response.
    pub provenance: Provenance,
    /// Per-backend results, present only on fan-out envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responses: Option<BTreeMap<String, FanOutResult>>,
}

impl StructuredResponse {
    /// Default confidence when the backend gives none (or an unusable one).
    pub const DEFAULT_CONFIDENCE: f64 = 0.5;

    /// Creates a response with an answer and empty content fields.
    #[must_use]
    pub fn new(answer: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            answer: answer.into(),
            claims: Vec::new(),
            evidence: Vec::new(),
            missing_info: Vec::new(),
            confidence: Self::DEFAULT_CONFIDENCE,
            actions_suggested: Vec::new(),
            provenance,
            responses: None,
        }
    }

    /// The degraded-service answer returned when no backend attempt succeeded.
    #[must_use]
    pub fn degraded(backend_id: impl Into<String>, error: &str) -> Self {
        let detail: String = error.chars().take(100).collect();
        let mut response = Self::new(
            format!("{DEGRADED_ANSWER} ({detail})"),
            Provenance::new(backend_id, "").with_error(error),
        );
        response.confidence = 0.0;
        response
    }

    /// Builds a fan-out envelope around per-backend results.
    #[must_use]
    pub fn fan_out(responses: BTreeMap<String, FanOutResult>) -> Self {
        let mut provenance = Provenance::new(crate::llm::FAN_OUT_ID, "");
        if responses.is_empty() {
            provenance = provenance.with_error("no enabled backends");
        }
        let mut envelope = Self::new(FAN_OUT_ANSWER, provenance);
        envelope.confidence = 0.0;
        envelope.responses = Some(responses);
        envelope
    }

    /// Whether the response came back without a recorded failure.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.provenance.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_response_has_zero_confidence() {
        let response = StructuredResponse::degraded("gpt", "API returned status: 503");
        assert!(response.answer.starts_with(DEGRADED_ANSWER));
        assert!(response.answer.contains("503"));
        assert!(response.confidence.abs() < f64::EPSILON);
        assert!(!response.is_success());
        assert_eq!(response.provenance.backend_id, "gpt");
    }

    #[test]
    fn test_degraded_answer_truncates_detail() {
        let long = "x".repeat(500);
        let response = StructuredResponse::degraded("gpt", &long);
        assert_eq!(
            response.answer.len(),
            DEGRADED_ANSWER.len() + " ()".len() + 100
        );
        assert_eq!(response.provenance.error.as_deref(), Some(long.as_str()));
    }

    #[test]
    fn test_fan_out_envelope_shape() {
        let mut results = BTreeMap::new();
        results.insert(
            "claude".to_string(),
            FanOutResult::Error {
                error: "disabled".to_string(),
            },
        );
        let envelope = StructuredResponse::fan_out(results);
        assert_eq!(envelope.answer, FAN_OUT_ANSWER);
        assert_eq!(envelope.provenance.backend_id, "all");
        assert!(envelope.is_success());
        assert_eq!(envelope.responses.as_ref().map(BTreeMap::len), Some(1));
    }

    #[test]
    fn test_fan_out_without_backends_records_error() {
        let envelope = StructuredResponse::fan_out(BTreeMap::new());
        assert!(!envelope.is_success());
    }

    #[test]
    fn test_serialization_skips_absent_optionals() {
        let response = StructuredResponse::new("ok", Provenance::new("gpt", "gpt-4o-mini"));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("responses").is_none());
        assert!(json["provenance"].get("error").is_none());
        assert_eq!(json["missing_info"], serde_json::json!([]));
    }
}
