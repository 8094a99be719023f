//! Builders that turn configuration into runtime components.

use crate::config::{BackendKind, BackendSettings, JnextConfig};
use crate::llm::{
    AnthropicClient, BackendEntry, BackendGateway, ChatBackend, GeminiClient, LlmHttpConfig,
    OllamaClient, OpenAiClient, RetryConfig, RetryPolicy,
};
use crate::scope::ScopeRegistry;
use crate::services::{CaptureService, ChatService};
use crate::storage::{
    ConversationLog, DocumentStore, FilesystemDocumentStore, SqliteConversationLog,
};
use crate::Result;
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Builds HTTP configuration from config with environment overrides.
#[must_use]
pub fn build_http_config(config: &JnextConfig) -> LlmHttpConfig {
    LlmHttpConfig::from_config(&config.http).with_env_overrides()
}

/// Builds the retry policy from config with environment overrides.
#[must_use]
pub fn build_retry_policy(config: &JnextConfig) -> RetryPolicy {
    RetryPolicy::new(RetryConfig::from_config(&config.retry).with_env_overrides())
}

/// Builds a Gemini client from backend settings.
#[must_use]
pub fn build_gemini_client(settings: &BackendSettings, http: LlmHttpConfig) -> GeminiClient {
    let mut client = GeminiClient::new();
    if let Some(api_key) = &settings.api_key {
        client = client.with_api_key(api_key.expose_secret());
    }
    if let Some(model) = &settings.model {
        client = client.with_model(model);
    }
    if let Some(base_url) = &settings.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(http)
}

/// Builds an `OpenAI` client from backend settings.
#[must_use]
pub fn build_openai_client(settings: &BackendSettings, http: LlmHttpConfig) -> OpenAiClient {
    let mut client = OpenAiClient::new();
    if let Some(api_key) = &settings.api_key {
        client = client.with_api_key(api_key.expose_secret());
    }
    if let Some(model) = &settings.model {
        client = client.with_model(model);
    }
    if let Some(base_url) = &settings.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(http)
}

/// Builds an Anthropic client from backend settings.
#[must_use]
pub fn build_anthropic_client(settings: &BackendSettings, http: LlmHttpConfig) -> AnthropicClient {
    let mut client = AnthropicClient::new();
    if let Some(api_key) = &settings.api_key {
        client = client.with_api_key(api_key.expose_secret());
    }
    if let Some(model) = &settings.model {
        client = client.with_model(model);
    }
    if let Some(base_url) = &settings.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(http)
}

/// Builds an Ollama client from backend settings.
#[must_use]
pub fn build_ollama_client(settings: &BackendSettings, http: LlmHttpConfig) -> OllamaClient {
    let mut client = OllamaClient::new();
    if let Some(model) = &settings.model {
        client = client.with_model(model);
    }
    if let Some(base_url) = &settings.base_url {
        client = client.with_endpoint(base_url);
    }
    client.with_http_config(http)
}

/// Builds the client for one backend.
#[must_use]
pub fn build_backend(settings: &BackendSettings, http: LlmHttpConfig) -> Arc<dyn ChatBackend> {
    match settings.kind {
        BackendKind::Gemini => Arc::new(build_gemini_client(settings, http)),
        BackendKind::OpenAi => Arc::new(build_openai_client(settings, http)),
        BackendKind::Anthropic => Arc::new(build_anthropic_client(settings, http)),
        BackendKind::Ollama => Arc::new(build_ollama_client(settings, http)),
    }
}

/// Builds the gateway with every configured backend registered.
#[must_use]
pub fn build_gateway(config: &JnextConfig) -> BackendGateway {
    let http = build_http_config(config);
    let mut gateway = BackendGateway::new(build_retry_policy(config));
    for (id, settings) in &config.backends {
        let display_name = settings.display_name.as_deref().unwrap_or(id);
        gateway.register(
            BackendEntry::new(id.clone(), display_name, build_backend(settings, http))
                .with_enabled(settings.enabled),
        );
    }
    gateway
}

/// Builds the scope registry from config, then adds persisted scopes.
///
/// Invalid config entries are logged and skipped.
#[must_use]
pub fn build_scope_registry(config: &JnextConfig, store: &dyn DocumentStore) -> ScopeRegistry {
    let mut registry = ScopeRegistry::new();
    for settings in &config.scopes {
        match settings.to_scope() {
            Ok(scope) => registry.register(scope),
            Err(e) => tracing::warn!(scope = %settings.id, error = %e, "Skipping invalid scope"),
        }
    }
    let loaded = registry.load_persisted(store);
    tracing::debug!(configured = config.scopes.len(), loaded, "Loaded topic scopes");
    registry
}

/// Opens the on-disk conversation log and document store.
///
/// # Errors
///
/// Returns an error if the data directory cannot be created or the
/// database cannot be opened.
pub fn open_storage(
    config: &JnextConfig,
) -> Result<(Arc<dyn ConversationLog>, Arc<dyn DocumentStore>)> {
    let log = SqliteConversationLog::new(config.conversation_db_path())?;
    let documents = FilesystemDocumentStore::new(config.documents_path())?;
    Ok((Arc::new(log), Arc::new(documents)))
}

/// Wires a chat service over the given storage.
#[must_use]
pub fn build_chat_service_with(
    config: &JnextConfig,
    gateway: Arc<BackendGateway>,
    log: Arc<dyn ConversationLog>,
    documents: Arc<dyn DocumentStore>,
) -> ChatService {
    let scopes = build_scope_registry(config, documents.as_ref());
    let mut service = ChatService::new(gateway.clone(), scopes, log.clone(), documents.clone())
        .with_history_limit(config.history_limit);
    if config.capture.enabled {
        let mut capture = CaptureService::new(gateway, documents, log);
        if let Some(backend) = &config.capture.metadata_backend {
            capture = capture.with_metadata_backend(backend);
        }
        service = service.with_capture(capture);
    }
    service
}

/// Wires a chat service over on-disk storage.
///
/// # Errors
///
/// Returns an error if storage cannot be opened.
pub fn build_chat_service(config: &JnextConfig) -> Result<ChatService> {
    let (log, documents) = open_storage(config)?;
    Ok(build_chat_service_with(
        config,
        Arc::new(build_gateway(config)),
        log,
        documents,
    ))
}
