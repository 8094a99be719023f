//! JSON schema of the structured response.

use serde_json::{Value, json};

/// Sentence introducing the schema to backends without native schema support.
pub const SCHEMA_DIRECTIVE: &str = "Respond only with JSON matching this schema:";

/// Returns the schema every backend is asked to satisfy.
#[must_use]
pub fn response_schema() -> Value {
    let text_list = json!({"type": "array", "items": {"type": "string"}});
    json!({
        "type": "object",
        "properties": {
            "answer": {"type": "string"},
            "claims": text_list,
            "evidence": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": {"type": "string"},
                        "field": {"type": "string"},
                        "value": {"type": "string"}
                    }
                }
            },
            "missing_info": text_list,
            "confidence": {"type": "number"},
            "actions_suggested": text_list
        },
        "required": [
            "answer",
            "claims",
            "evidence",
            "missing_info",
            "confidence",
            "actions_suggested"
        ]
    })
}

/// Renders the directive followed by a pretty-printed schema.
#[must_use]
pub fn schema_instructions(schema: &Value) -> String {
    let rendered = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!("{SCHEMA_DIRECTIVE}\n{rendered}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_requires_six_fields() {
        let schema = response_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 6);
        assert!(schema["properties"]["confidence"]["type"] == "number");
    }

    #[test]
    fn test_schema_instructions_embed_schema_verbatim() {
        let schema = response_schema();
        let text = schema_instructions(&schema);
        assert!(text.starts_with(SCHEMA_DIRECTIVE));
        assert!(text.contains("\"actions_suggested\""));
    }
}
