//! Anthropic Claude client.

use super::{
    BackendRequest, ChatBackend, LlmHttpConfig, build_http_client, schema_instructions,
    status_error, transport_error,
};
use crate::models::Role;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Maps a neutral role onto the Messages API vocabulary.
#[must_use]
pub const fn to_wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
    }
}

/// Maps a Messages API role back onto the neutral vocabulary.
#[must_use]
pub fn from_wire_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Model),
        _ => None,
    }
}

/// Anthropic Claude client.
pub struct AnthropicClient {
    /// API key.
    api_key: Option<String>,
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.anthropic.com/v1";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "claude-3-5-haiku-latest";

    /// Creates a new Anthropic client.
    #[must_use]
    pub fn new() -> Self {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok();
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

    /// Validates that the client is configured with a plausible API key.
    fn validate(&self) -> Result<&str> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::OperationFailed {
                operation: "anthropic_request".to_string(),
                cause: "ANTHROPIC_API_KEY not set".to_string(),
            })?;

        if !Self::is_valid_api_key_format(key) {
            return Err(Error::OperationFailed {
                operation: "anthropic_request".to_string(),
                cause: "Invalid API key format: expected 'sk-ant-' prefix".to_string(),
            });
        }

        Ok(key)
    }

    /// Checks if an API key has a valid format.
    ///
    /// Valid keys start with `sk-ant-`, are at least 40 characters, and contain
    /// only alphanumerics, hyphens, and underscores. Malformed keys are
    /// rejected before any network request.
    fn is_valid_api_key_format(key: &str) -> bool {
        const MIN_KEY_LENGTH: usize = 40;
        const PREFIX: &str = "sk-ant-";

        if !key.starts_with(PREFIX) || key.len() < MIN_KEY_LENGTH {
            return false;
        }

        key.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Translates a neutral request into a Messages body.
    ///
    /// The schema is appended to the `system` field; history keeps its order.
    fn build_body(&self, request: &BackendRequest) -> MessagesRequest {
        let mut system = request.system_text();
        if let Some(schema) = &request.schema {
            system = format!("{system}\n\n{}", schema_instructions(schema));
        }

        let mut messages: Vec<Message> = request
            .history
            .iter()
            .map(|turn| Message {
                role: to_wire_role(turn.role).to_string(),
                content: turn.text.clone(),
            })
            .collect();
        messages.push(Message {
            role: to_wire_role(Role::User).to_string(),
            content: request.message.clone(),
        });

        MessagesRequest {
            model: self.model.clone(),
            max_tokens: 2048,
            system,
            messages,
            temperature: request.temperature(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBackend for AnthropicClient {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &BackendRequest) -> Result<String> {
        let api_key = self.validate()?;

        tracing::info!(provider = "anthropic", model = %self.model, "Making backend request");

        let body = self.build_body(request);
        let response = self
            .client
            .post(format!("{}/messages", self.endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .map_err(|e| transport_error("anthropic", &self.model, "anthropic_request", &e))?;

        if !response.status().is_success() {
            return Err(status_error(
                "anthropic",
                &self.model,
                "anthropic_request",
                response,
            ));
        }

        let response: MessagesResponse = response.json().map_err(|e| {
            tracing::error!(
                provider = "anthropic",
                model = %self.model,
                error = %e,
                "Failed to parse backend response"
            );
            Error::OperationFailed {
                operation: "anthropic_response".to_string(),
                cause: e.to_string(),
            }
        })?;

        let text: String = response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect();

        if text.is_empty() {
            return Err(Error::OperationFailed {
                operation: "anthropic_response".to_string(),
                cause: "No text content in response".to_string(),
            });
        }
        Ok(text)
    }
}

/// Request to the Messages API.
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
    temperature: f32,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// Response from the Messages API.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

/// A content block in the response.
#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{SCHEMA_DIRECTIVE, Turn, response_schema};

    const VALID_KEY: &str = "sk-ant-REDACTED";

    #[test]
    fn test_client_creation() {
        let client = AnthropicClient::new();
        assert_eq!(client.name(), "anthropic");
        assert_eq!(client.model(), AnthropicClient::DEFAULT_MODEL);
    }

    #[test]
    fn test_client_configuration() {
        let client = AnthropicClient::new()
            .with_api_key(VALID_KEY)
            .with_endpoint("https://custom.endpoint")
            .with_model("claude-3-opus");

        assert_eq!(client.api_key.as_deref(), Some(VALID_KEY));
        assert_eq!(client.endpoint, "https://custom.endpoint");
        assert_eq!(client.model, "claude-3-opus");
    }

    #[test]
    fn test_validate_no_key() {
        let client = AnthropicClient {
            api_key: None,
            endpoint: AnthropicClient::DEFAULT_ENDPOINT.to_string(),
            model: AnthropicClient::DEFAULT_MODEL.to_string(),
            client: reqwest::blocking::Client::new(),
        };
        assert!(client.validate().is_err());
    }

    #[test]
    fn test_validate_key_format() {
        assert!(AnthropicClient::new().with_api_key(VALID_KEY).validate().is_ok());
        assert!(
            AnthropicClient::new()
                .with_api_key("sk-proj-not-an-anthropic-key-at-all-0000000")
                .validate()
                .is_err()
        );
        assert!(!AnthropicClient::is_valid_api_key_format("sk-ant-short"));
        assert!(!AnthropicClient::is_valid_api_key_format(
            "sk-ant-REDACTED\n56789"
        ));
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::User, Role::Model] {
            assert_eq!(from_wire_role(to_wire_role(role)), Some(role));
        }
        assert_eq!(from_wire_role("model"), None);
    }

    #[test]
    fn test_body_appends_schema_to_system_field() {
        let client = AnthropicClient::new();
        let request = BackendRequest::new("Be brief.", "what is a reset?")
            .with_history(vec![
                Turn::new(Role::User, "hello"),
                Turn::new(Role::Model, "hi"),
            ])
            .with_knowledge("[DRAFT] Reset: pause and breathe")
            .with_schema(response_schema());
        let body = serde_json::to_value(client.build_body(&request)).unwrap();

        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("Be brief."));
        assert!(system.contains("[Reference knowledge]"));
        assert!(system.ends_with('}'));
        assert!(system.contains(SCHEMA_DIRECTIVE));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["role"], "user");
    }
}
