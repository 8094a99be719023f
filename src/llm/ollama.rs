//! Ollama (local) client.

use super::{
    BackendRequest, ChatBackend, LlmHttpConfig, build_http_client, status_error, transport_error,
};
use crate::models::Role;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maps a neutral role onto Ollama's chat vocabulary.
#[must_use]
pub const fn to_wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "assistant",
    }
}

/// Maps an Ollama chat role back onto the neutral vocabulary.
#[must_use]
pub fn from_wire_role(role: &str) -> Option<Role> {
    match role {
        "user" => Some(Role::User),
        "assistant" => Some(Role::Model),
        _ => None,
    }
}

/// Ollama local chat client.
pub struct OllamaClient {
    /// API endpoint.
    endpoint: String,
    /// Model to use.
    model: String,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OllamaClient {
    /// Default API endpoint.
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    /// Default model.
    pub const DEFAULT_MODEL: &'static str = "llama3.2";

    /// Creates a new Ollama client.
    #[must_use]
    pub fn new() -> Self {
        let endpoint =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string());

        Self {
            endpoint,
            model,
            client: build_http_client(LlmHttpConfig::from_env()),
        }
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

    /// Checks if Ollama is reachable.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.client
            .get(format!("{}/api/tags", self.endpoint))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Translates a neutral request into an `/api/chat` body.
    ///
    /// Instructions travel as the first `system` message; the schema uses the
    /// native `format` field.
    fn build_body(&self, request: &BackendRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: request.system_text(),
        });
        messages.extend(request.history.iter().map(|turn| ChatMessage {
            role: to_wire_role(turn.role).to_string(),
            content: turn.text.clone(),
        }));
        messages.push(ChatMessage {
            role: to_wire_role(Role::User).to_string(),
            content: request.message.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            format: request.schema.clone(),
            options: ChatOptions {
                temperature: request.temperature(),
            },
        }
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatBackend for OllamaClient {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn generate(&self, request: &BackendRequest) -> Result<String> {
        tracing::info!(provider = "ollama", model = %self.model, "Making backend chat request");

        let body = self.build_body(request);
        let response = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()
            .map_err(|e| transport_error("ollama", &self.model, "ollama_chat", &e))?;

        if !response.status().is_success() {
            return Err(status_error("ollama", &self.model, "ollama_chat", response));
        }

        let response: ChatResponse = response.json().map_err(|e| {
            tracing::error!(
                provider = "ollama",
                model = %self.model,
                error = %e,
                "Failed to parse backend chat response"
            );
            Error::OperationFailed {
                operation: "ollama_chat_response".to_string(),
                cause: e.to_string(),
            }
        })?;

        Ok(response.message.content)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}
