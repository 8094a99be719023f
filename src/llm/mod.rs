//! Multi-backend response gateway.
//!
//! Provides a uniform contract over interchangeable text-generation backends.
//! Each client translates the neutral [`BackendRequest`] into its provider's
//! wire format; the [`BackendGateway`] repairs whatever comes back into a
//! [`StructuredResponse`](crate::models::StructuredResponse).
//!
//! | Backend | Wire roles | Schema delivery |
//! |---------|------------|-----------------|
//! | Gemini | `user` / `model` | native `systemInstruction` + `responseSchema` |
//! | `OpenAI` | `user` / `assistant` | first `system` message |
//! | Anthropic | `user` / `assistant` | appended to `system` |
//! | Ollama | `user` / `assistant` | native `format` + first `system` message |

pub mod anthropic;
mod gateway;
pub mod gemini;
pub mod ollama;
pub mod openai;
mod resilience;
mod schema;
mod turn;
mod validate;

pub use anthropic::AnthropicClient;
pub use gateway::{BackendEntry, BackendGateway, BackendSummary};
pub use gemini::GeminiClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use resilience::{
    CancelToken, RetryConfig, RetryPolicy, Sleeper, TRANSIENT_SIGNATURES, TokenSleeper,
    is_transient_error,
};
pub use schema::{SCHEMA_DIRECTIVE, response_schema, schema_instructions};
pub use turn::Turn;
pub use validate::{PARSE_FAILURE, parse_structured, validate_fields, validate_response};

use crate::{Error, Result};
use serde_json::Value;
use std::time::Duration;

/// Backend id that fans a request out to every enabled backend.
pub const FAN_OUT_ID: &str = "all";

/// Heading under which topic knowledge is appended to the instructions.
pub const KNOWLEDGE_HEADING: &str = "[Reference knowledge]";

/// A backend-neutral generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendRequest {
    /// System-level instructions.
    pub instructions: String,
    /// The message to answer.
    pub message: String,
    /// Prior turns in native form, oldest first.
    pub history: Vec<Turn>,
    /// Reference knowledge appended to the instructions.
    pub knowledge: Option<String>,
    /// Sampling temperature in `[0, 1]`.
    pub creativity: f64,
    /// JSON schema the reply should follow.
    pub schema: Option<Value>,
}

impl BackendRequest {
    /// Creates a request with no history, knowledge, or schema.
    #[must_use]
    pub fn new(instructions: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            message: message.into(),
            history: Vec::new(),
            knowledge: None,
            creativity: 0.5,
            schema: None,
        }
    }

    /// Sets prior turns.
    #[must_use]
    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    /// Sets reference knowledge.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: impl Into<String>) -> Self {
        self.knowledge = Some(knowledge.into());
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn with_creativity(mut self, creativity: f64) -> Self {
        self.creativity = creativity;
        self
    }

    /// Sets the reply schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Instructions with the knowledge block appended, if any.
    #[must_use]
    pub fn system_text(&self) -> String {
        match self.knowledge.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(knowledge) => format!(
                "{}\n\n{KNOWLEDGE_HEADING}\n{}",
                self.instructions.trim_end(),
                knowledge.trim_end()
            ),
            None => self.instructions.clone(),
        }
    }

    /// Temperature as sent on the wire.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.creativity.clamp(0.0, 1.0) as f32
    }
}

/// A text-generation backend.
pub trait ChatBackend: Send + Sync {
    /// The provider family (`gemini`, `openai`, `anthropic`, `ollama`).
    fn name(&self) -> &'static str;

    /// The concrete model identifier.
    fn model(&self) -> &str;

    /// Generates raw reply text for a request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] on transport errors or a non-success
    /// status. The status code stays in the cause so the retry policy can
    /// recognize transient failures.
    fn generate(&self, request: &BackendRequest) -> Result<String>;
}

/// HTTP client configuration for backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmHttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for LlmHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl LlmHttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Loads HTTP configuration from config file settings.
    #[must_use]
    pub fn from_config(config: &crate::config::HttpConfig) -> Self {
        let mut settings = Self::default();
        if let Some(timeout_ms) = config.timeout_ms {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = config.connect_timeout_ms {
            settings.connect_timeout_ms = connect_timeout_ms;
        }
        settings
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(timeout_ms) = env_u64("JNEXT_LLM_TIMEOUT_MS") {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) = env_u64("JNEXT_LLM_CONNECT_TIMEOUT_MS") {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Builds a blocking HTTP client with configured timeouts.
#[must_use]
pub fn build_http_client(config: LlmHttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder();
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build backend HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Converts a transport error into an [`Error`], logging its kind.
///
/// Timeouts keep the word `timeout` in the cause so they are retried.
fn transport_error(provider: &str, model: &str, operation: &str, e: &reqwest::Error) -> Error {
    let error_kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else {
        "unknown"
    };
    tracing::error!(
        provider = provider,
        model = %model,
        error = %e,
        error_kind = error_kind,
        is_timeout = e.is_timeout(),
        is_connect = e.is_connect(),
        "Backend request failed"
    );
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("{error_kind} error: {e}"),
    }
}

/// Turns a non-success HTTP response into an [`Error`].
fn status_error(
    provider: &str,
    model: &str,
    operation: &str,
    response: reqwest::blocking::Response,
) -> Error {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    tracing::error!(
        provider = provider,
        model = %model,
        status = %status,
        body = %body,
        "Backend API returned error status"
    );
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: format!("API returned status: {status} - {body}"),
    }
}

/// Extracts JSON from a reply, handling markdown code blocks and prose prefixes.
///
/// A reply that already parses as JSON is returned whole, so fences inside
/// string values are never mistaken for block delimiters. Otherwise the first
/// fenced block or bracketed span that parses wins, falling back to the first
/// candidate found.
pub(crate) fn extract_json_from_response(response: &str) -> &str {
    let trimmed = response.trim();
    if is_json(trimmed) {
        return trimmed;
    }

    let candidates = [
        fenced_block(trimmed, "```json"),
        unlabelled_fence(trimmed),
        delimited_span(trimmed, '{', '}'),
        delimited_span(trimmed, '[', ']'),
    ];
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|candidate| is_json(candidate))
        .or_else(|| candidates.iter().flatten().copied().next())
        .unwrap_or(trimmed)
}

fn is_json(text: &str) -> bool {
    serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
}

fn fenced_block<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    let start = text.find(marker)? + marker.len();
    let end = text[start..].find("```")?;
    Some(text[start..start + end].trim())
}

/// A ``` block without a language marker, skipping to its first `{`.
fn unlabelled_fence(text: &str) -> Option<&str> {
    let content_start = text.find("```")? + 3;
    let json_start = text[content_start..]
        .find('{')
        .map_or(content_start, |pos| content_start + pos);
    let end = text[json_start..].find("```")?;
    Some(text[json_start..json_start + end].trim())
}

fn delimited_span(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_raw() {
        let response = r#"{"answer": "value"}"#;
        assert_eq!(extract_json_from_response(response), response);
    }

    #[test]
    fn test_extract_json_markdown() {
        let response = "```json\n{\"answer\": \"value\"}\n```";
        assert_eq!(
            extract_json_from_response(response),
            r#"{"answer": "value"}"#
        );
    }

    #[test]
    fn test_extract_json_unlabelled_fence() {
        let response = "```\n{\"answer\": \"value\"}\n```";
        assert_eq!(
            extract_json_from_response(response),
            r#"{"answer": "value"}"#
        );
    }

    #[test]
    fn test_extract_json_with_prefix() {
        let response = "Here is the result: {\"answer\": \"value\"} hope this helps";
        assert_eq!(
            extract_json_from_response(response),
            r#"{"answer": "value"}"#
        );
    }

    #[test]
    fn test_extract_json_array() {
        let response = r#"["walking", "pelvis", "reset"]"#;
        assert_eq!(extract_json_from_response(response), response);
    }

    #[test]
    fn test_extract_json_keeps_fences_inside_strings() {
        let response = r#"{"answer": "Run ```ls``` first", "claims": ["a"]}"#;
        assert_eq!(extract_json_from_response(response), response);

        let prefixed = format!("Sure: {response}");
        assert_eq!(extract_json_from_response(&prefixed), response);
    }

    #[test]
    fn test_extract_json_reversed_braces_returns_text() {
        assert_eq!(extract_json_from_response(" } oops { "), "} oops {");
    }

    #[test]
    fn test_system_text_appends_knowledge() {
        let request = BackendRequest::new("Be brief.", "hi").with_knowledge("[FINAL] Reset: pause");
        assert_eq!(
            request.system_text(),
            "Be brief.\n\n[Reference knowledge]\n[FINAL] Reset: pause"
        );
        let bare = BackendRequest::new("Be brief.", "hi").with_knowledge("  ");
        assert_eq!(bare.system_text(), "Be brief.");
    }

    #[test]
    fn test_temperature_is_clamped() {
        let request = BackendRequest::new("", "hi").with_creativity(1.7);
        assert!((request.temperature() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_http_config_from_config() {
        let config = crate::config::HttpConfig {
            timeout_ms: Some(5_000),
            connect_timeout_ms: None,
        };
        let settings = LlmHttpConfig::from_config(&config);
        assert_eq!(settings.timeout_ms, 5_000);
        assert_eq!(settings.connect_timeout_ms, 3_000);
    }
}
