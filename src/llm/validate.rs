//! Repair of raw backend output into a [`StructuredResponse`].
//!
//! Backends are asked for JSON but routinely return fenced, prefixed, partial,
//! or mistyped output. Everything here is total: any input produces a response
//! with all six content fields present and type-correct.

use super::extract_json_from_response;
use crate::models::{Evidence, Provenance, StructuredResponse};
use serde_json::{Map, Value};

/// Entry recorded in `missing_info` when output could not be parsed.
pub const PARSE_FAILURE: &str = "parse failure";

/// Parses raw backend text into a validated response.
///
/// Non-JSON output (or JSON that is not an object) becomes a response whose
/// answer is the raw text, with [`PARSE_FAILURE`] recorded and
/// `provenance.error` set.
#[must_use]
pub fn parse_structured(raw: &str, provenance: Provenance) -> StructuredResponse {
    let candidate = extract_json_from_response(raw);
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(fields)) => validate_fields(&fields, provenance),
        Ok(other) => parse_failure(
            raw,
            provenance,
            &format!("expected a JSON object, got {}", json_kind(&other)),
        ),
        Err(e) => parse_failure(raw, provenance, &e.to_string()),
    }
}

/// Validates an already-decoded JSON object.
///
/// Missing fields are back-filled, list fields that are not lists become
/// empty, a non-numeric confidence becomes the default, and confidence is
/// clamped to `[0, 1]`. Unknown keys are ignored.
#[must_use]
pub fn validate_fields(fields: &Map<String, Value>, provenance: Provenance) -> StructuredResponse {
    let answer = match fields.get("answer") {
        None | Some(Value::Null) => String::new(),
        Some(value) => value_text(value),
    };

    let mut response = StructuredResponse::new(answer, provenance);
    response.claims = text_list(fields.get("claims"));
    response.evidence = evidence_list(fields.get("evidence"));
    response.missing_info = text_list(fields.get("missing_info"));
    response.actions_suggested = text_list(fields.get("actions_suggested"));
    response.confidence = fields
        .get("confidence")
        .and_then(Value::as_f64)
        .map_or(StructuredResponse::DEFAULT_CONFIDENCE, clamp_confidence);
    response
}

/// Re-validates a typed response.
///
/// Idempotent: validating a validated response changes nothing.
#[must_use]
pub fn validate_response(mut response: StructuredResponse) -> StructuredResponse {
    response.confidence = if response.confidence.is_finite() {
        clamp_confidence(response.confidence)
    } else {
        StructuredResponse::DEFAULT_CONFIDENCE
    };
    response
}

fn parse_failure(raw: &str, provenance: Provenance, detail: &str) -> StructuredResponse {
    tracing::warn!(
        backend = %provenance.backend_id,
        error = %detail,
        raw_len = raw.len(),
        "Backend returned unparseable output"
    );
    let mut response = StructuredResponse::new(
        raw,
        provenance.with_error(format!("{PARSE_FAILURE}: {detail}")),
    );
    response.missing_info = vec![PARSE_FAILURE.to_string()];
    response
}

fn clamp_confidence(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Renders a JSON value as text: strings verbatim, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        _ => Vec::new(),
    }
}

fn evidence_list(value: Option<&Value>) -> Vec<Evidence> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(entry) => {
                let field = |key: &str| {
                    entry
                        .get(key)
                        .filter(|v| !v.is_null())
                        .map(value_text)
                        .unwrap_or_default()
                };
                Evidence {
                    source: field("source"),
                    field: field("field"),
                    value: field("value"),
                }
            },
            other => Evidence {
                value: value_text(other),
                ..Evidence::default()
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn provenance() -> Provenance {
        Provenance::new("gemini-flash", "gemini-2.0-flash")
    }

    fn validate(value: &Value) -> StructuredResponse {
        validate_fields(value.as_object().unwrap(), provenance())
    }

    #[test]
    fn test_non_json_reply_becomes_parse_failure() {
        let raw = "Sorry, I can only answer in prose today.";
        let response = parse_structured(raw, provenance());

        assert_eq!(response.answer, raw);
        assert!(response.claims.is_empty());
        assert!(response.evidence.is_empty());
        assert_eq!(response.missing_info, vec![PARSE_FAILURE.to_string()]);
        assert!((response.confidence - 0.5).abs() < f64::EPSILON);
        assert!(response.provenance.error.is_some());
        assert!(!response.is_success());
    }

    #[test]
    fn test_fenced_reply_is_parsed() {
        let raw = "Here you go:\n```json\n{\"answer\": \"slow the descent\", \"confidence\": 0.8}\n```";
        let response = parse_structured(raw, provenance());
        assert_eq!(response.answer, "slow the descent");
        assert!((response.confidence - 0.8).abs() < f64::EPSILON);
        assert!(response.is_success());
    }

    #[test]
    fn test_code_fence_inside_answer_is_not_a_block() {
        let raw = r#"{"answer": "Run ```ls``` first", "claims": ["a"], "evidence": [], "missing_info": [], "actions_suggested": [], "confidence": 0.9}"#;
        let response = parse_structured(raw, provenance());
        assert_eq!(response.answer, "Run ```ls``` first");
        assert_eq!(response.claims, vec!["a".to_string()]);
        assert!((response.confidence - 0.9).abs() < f64::EPSILON);
        assert!(response.provenance.error.is_none());
        assert!(response.is_success());
    }

    #[test]
    fn test_json_array_is_not_an_object() {
        let response = parse_structured("[1, 2, 3]", provenance());
        assert_eq!(response.answer, "[1, 2, 3]");
        assert!(!response.is_success());
    }

    #[test]
    fn test_missing_fields_are_back_filled() {
        let response = validate(&json!({}));
        assert_eq!(response.answer, "");
        assert!(response.claims.is_empty());
        assert!(response.actions_suggested.is_empty());
        assert!((response.confidence - 0.5).abs() < f64::EPSILON);
        assert!(response.is_success());
    }

    #[test]
    fn test_mistyped_fields_are_coerced() {
        let response = validate(&json!({
            "answer": 42,
            "claims": "not a list",
            "evidence": ["bare text", {"source": "draft", "value": 3}],
            "missing_info": null,
            "confidence": "high",
            "actions_suggested": [true, "rest"]
        }));

        assert_eq!(response.answer, "42");
        assert!(response.claims.is_empty());
        assert_eq!(
            response.evidence,
            vec![
                Evidence {
                    source: String::new(),
                    field: String::new(),
                    value: "bare text".to_string(),
                },
                Evidence {
                    source: "draft".to_string(),
                    field: String::new(),
                    value: "3".to_string(),
                },
            ]
        );
        assert!(response.missing_info.is_empty());
        assert!((response.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(response.actions_suggested, vec!["true", "rest"]);
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert!((validate(&json!({"confidence": 7})).confidence - 1.0).abs() < f64::EPSILON);
        assert!(validate(&json!({"confidence": -2.5})).confidence.abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_response_repairs_nan() {
        let mut response = StructuredResponse::new("x", provenance());
        response.confidence = f64::NAN;
        assert!((validate_response(response).confidence - 0.5).abs() < f64::EPSILON);
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1000.0f64..1000.0).prop_map(|f| json!(f)),
            "[a-z ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_response_object() -> impl Strategy<Value = Map<String, Value>> {
        let key = prop_oneof![
            Just("answer".to_string()),
            Just("claims".to_string()),
            Just("evidence".to_string()),
            Just("missing_info".to_string()),
            Just("confidence".to_string()),
            Just("actions_suggested".to_string()),
            "[a-z]{1,6}",
        ];
        prop::collection::btree_map(key, arb_json(), 0..8).prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_validation_is_idempotent(fields in arb_response_object()) {
            let once = validate_fields(&fields, provenance());
            let reencoded = serde_json::to_value(&once).unwrap();
            let again = reencoded.as_object().cloned().unwrap_or_default();
            let twice = validate_fields(&again, provenance());
            prop_assert_eq!(&once, &twice);
            prop_assert_eq!(validate_response(once.clone()), once);
        }

        #[test]
        fn prop_confidence_always_in_unit_interval(fields in arb_response_object()) {
            let response = validate_fields(&fields, provenance());
            prop_assert!((0.0..=1.0).contains(&response.confidence));
        }

        #[test]
        fn prop_parse_structured_is_total(raw in "\\PC{0,200}") {
            let response = parse_structured(&raw, provenance());
            prop_assert!((0.0..=1.0).contains(&response.confidence));
            if !response.is_success() {
                prop_assert_eq!(response.answer, raw);
            }
        }
    }
}
