//! Google Gemini client.

use super::{
    BackendRequest, ChatBackend, LlmHttpConfig, Turn, build_http_client, status_error,
    transport_error,
};
use crate::models::Role;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps a neutral role onto Gemini's vocabulary.
#[must_use]
pub const fn to_wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

/// Maps a Gemini role back onto the neutral vocabulary.
#[must_use]
pub fn from_wire_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "model" => Some(Role::Model),
        _ => None,
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "gemini-2.0-flash";

    /// Creates a new Gemini client.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("GEMINI_API_KEY").ok();
        Self {
            api_key,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            client: build_http_client(LlmHttpConfig::from_env()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::OperationFailed {
                operation: "gemini_request".to_string(),
                cause: "GEMINI_API_KEY not set".to_string(),
            })
    }

    /// Translates a neutral request into the `generateContent` body.
    fn build_body(request: &BackendRequest) -> GenerateContentRequest {
        let mut contents: Vec<Content> = request.history.iter().map(Content::from).collect();
        contents.push(Content::from(&Turn::new(Role::User, request.message.clone())));

        let response_mime_type = request
            .schema
            .as_ref()
            .map(|_| "application/json".to_string());

        GenerateContentRequest {
            system_instruction: Some(SystemInstruction {
                parts: vec![Part {
                    text: request.system_text(),
                }],
            }),
            contents,
            generation_config: GenerationConfig {
                temperature: request.temperature(),
                response_mime_type,
                response_schema: request.schema.clone(),
            },
        }
    }
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBackend for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &BackendRequest) -> Result<String> {
        let api_key = self.api_key()?;

        tracing::info!(provider = "gemini", model = %self.model, "Making backend request");

        let body = Self::build_body(request);
        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| transport_error("gemini", &self.model, "gemini_request", &e))?;

        if !response.status().is_success() {
            return Err(status_error(
                "gemini",
                &self.model,
                "gemini_request",
                response,
            ));
        }

        let response: GenerateContentResponse =
            response.json().map_err(|e| Error::OperationFailed {
                operation: "gemini_response".to_string(),
                cause: e.to_string(),
            })?;

        response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<String>()
            })
            .ok_or_else(|| Error::OperationFailed {
                operation: "gemini_response".to_string(),
                cause: "No candidates in response".to_string(),
            })
    }
}

/// Request to the `generateContent` API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

/// One turn in Gemini's format.
#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

impl From<&Turn> for Content {
    fn from(turn: &Turn) -> Self {
        Self {
            role: to_wire_role(turn.role).to_string(),
            parts: vec![Part {
                text: turn.text.clone(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

/// Response from the `generateContent` API.
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::response_schema;

    #[test]
    fn test_client_creation() {
        let client = GeminiClient::new();
        assert_eq!(client.name(), "gemini");
        assert_eq!(client.model(), GeminiClient::DEFAULT_MODEL);
    }

    #[test]
    fn test_client_configuration() {
        let client = GeminiClient::new()
            .with_api_key("test-key")
            .with_endpoint("https://custom.endpoint")
            .with_model("gemini-1.5-pro");

        assert_eq!(client.api_key, Some("test-key".to_string()));
        assert_eq!(client.endpoint, "https://custom.endpoint");
        assert_eq!(client.model, "gemini-1.5-pro");
    }

    #[test]
    fn test_missing_key_fails_locally() {
        let client = GeminiClient {
            api_key: None,
            endpoint: GeminiClient::DEFAULT_ENDPOINT.to_string(),
            model: GeminiClient::DEFAULT_MODEL.to_string(),
            client: reqwest::blocking::Client::new(),
        };
        let result = client.generate(&BackendRequest::new("", "hi"));
        assert!(matches!(result, Err(Error::OperationFailed { .. })));
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::User, Role::Model] {
            assert_eq!(from_wire_role(to_wire_role(role)), Some(role));
        }
        assert_eq!(to_wire_role(Role::Model), "model");
        assert_eq!(from_wire_role("assistant"), None);
    }

    #[test]
    fn test_body_uses_native_schema_and_system_instruction() {
        let request = BackendRequest::new("Be brief.", "what is a reset?")
            .with_history(vec![
                Turn::new(Role::User, "hello"),
                Turn::new(Role::Model, "hi"),
            ])
            .with_schema(response_schema());
        let body = serde_json::to_value(GeminiClient::build_body(&request)).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["role"], "user");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "what is a reset?");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            body["generationConfig"]["responseSchema"],
            response_schema()
        );
    }

    #[test]
    fn test_body_without_schema_omits_json_mode() {
        let body =
            serde_json::to_value(GeminiClient::build_body(&BackendRequest::new("", "hi"))).unwrap();
        assert!(body["generationConfig"].get("responseSchema").is_none());
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }
}
