//! Chat orchestration.
//!
//! One call runs classification, context composition, the backend gateway,
//! and best-effort capture. Its only error path is caller-side validation.

use super::capture::{CaptureInput, CaptureService};
use super::knowledge::{DEFAULT_KNOWLEDGE_LIMIT, build_knowledge_snippet};
use crate::context::{
    ComposeRequest, ContextWeights, MAX_HISTORY_TURNS, MAX_KNOWLEDGE_FOCUS, compose_context,
};
use crate::intent::{ClassificationResult, classify, classify_with};
use crate::llm::{BackendGateway, BackendRequest, CancelToken};
use crate::models::{CapturedArtifact, ExchangeId, Role, StructuredResponse, Utterance};
use crate::scope::{ScopeRegistry, TopicScope};
use crate::storage::{ConversationLog, Document, DocumentStore};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Backend used when a request names none.
pub const DEFAULT_BACKEND: &str = "gemini-flash";

/// Creativity used when a request sets none.
pub const DEFAULT_CREATIVITY: f64 = 0.7;

/// One chat request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// The user's utterance.
    pub utterance: String,
    /// Backend id, or `all` to fan out.
    pub backend: String,
    /// Topic scope id, if the exchange is scoped.
    pub scope: Option<String>,
    /// Creativity in `[0, 1]`.
    pub creativity: f64,
    /// Knowledge focus in `0..=100`.
    pub knowledge_focus: u8,
}

impl ChatRequest {
    /// Creates an unscoped request against the default backend.
    #[must_use]
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            backend: DEFAULT_BACKEND.to_string(),
            scope: None,
            creativity: DEFAULT_CREATIVITY,
            knowledge_focus: 0,
        }
    }

    /// Sets the backend id.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    /// Sets the topic scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the creativity.
    #[must_use]
    pub const fn with_creativity(mut self, creativity: f64) -> Self {
        self.creativity = creativity;
        self
    }

    /// Sets the knowledge focus.
    #[must_use]
    pub const fn with_knowledge_focus(mut self, focus: u8) -> Self {
        self.knowledge_focus = focus;
        self
    }
}

/// What one chat call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    /// The validated, possibly degraded, response.
    pub response: StructuredResponse,
    /// Section weights used for composition.
    pub weights: ContextWeights,
    /// Creativity handed to the backend.
    pub creativity: f64,
    /// How the utterance was classified.
    pub classification: ClassificationResult,
    /// The user turn's id, when the log accepted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<ExchangeId>,
    /// The artifact written by capture, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<CapturedArtifact>,
}

/// Chat orchestrator.
pub struct ChatService {
    gateway: Arc<BackendGateway>,
    scopes: ScopeRegistry,
    log: Arc<dyn ConversationLog>,
    documents: Arc<dyn DocumentStore>,
    capture: Option<CaptureService>,
    history_limit: usize,
    knowledge_limit: usize,
}

impl ChatService {
    /// Creates a service with capture disabled.
    #[must_use]
    pub fn new(
        gateway: Arc<BackendGateway>,
        scopes: ScopeRegistry,
        log: Arc<dyn ConversationLog>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            gateway,
            scopes,
            log,
            documents,
            capture: None,
            history_limit: MAX_HISTORY_TURNS,
            knowledge_limit: DEFAULT_KNOWLEDGE_LIMIT,
        }
    }

    /// Enables capture of scoped exchanges.
    #[must_use]
    pub fn with_capture(mut self, capture: CaptureService) -> Self {
        self.capture = Some(capture);
        self
    }

    /// Sets how many recent turns are loaded. Capped at
    /// [`MAX_HISTORY_TURNS`].
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.min(MAX_HISTORY_TURNS);
        self
    }

    /// Sets how many documents per stage feed the knowledge snippet.
    #[must_use]
    pub const fn with_knowledge_limit(mut self, limit: usize) -> Self {
        self.knowledge_limit = limit;
        self
    }

    /// The backend gateway.
    #[must_use]
    pub fn gateway(&self) -> &BackendGateway {
        &self.gateway
    }

    /// The scope registry.
    #[must_use]
    pub const fn scopes(&self) -> &ScopeRegistry {
        &self.scopes
    }

    /// The capture service, when capture is enabled.
    #[must_use]
    pub const fn capture_service(&self) -> Option<&CaptureService> {
        self.capture.as_ref()
    }

    /// Creates a topic scope and persists it to the document store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a malformed id.
    pub fn create_scope(
        &mut self,
        id: &str,
        display_name: &str,
        description: &str,
    ) -> Result<&TopicScope> {
        self.scopes
            .create(id, display_name, description, Some(self.documents.as_ref()))
    }

    /// Classifies an utterance with the scope's vocabulary, if any.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown scope.
    pub fn classify(&self, utterance: &str, scope: Option<&str>) -> Result<ClassificationResult> {
        match scope {
            Some(id) => Ok(classify_with(utterance, &self.scopes.require(id)?.vocabulary())),
            None => Ok(classify(utterance)),
        }
    }

    /// Answers one request.
    ///
    /// Mutating intents are classified and reported but never executed.
    /// Conversation-log and capture failures are logged and do not fail the
    /// call; backend failures come back as a degraded response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty utterance or
    /// out-of-range creativity or focus, and [`Error::NotFound`] for an
    /// unknown scope.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(backend = %request.backend, scope = ?request.scope)
    )]
    pub fn respond(&self, request: &ChatRequest, cancel: &CancelToken) -> Result<ChatOutcome> {
        let start = Instant::now();
        validate(request)?;
        let scope = request
            .scope
            .as_deref()
            .map(|id| self.scopes.require(id))
            .transpose()?;

        let classification = match scope {
            Some(scope) => classify_with(&request.utterance, &scope.vocabulary()),
            None => classify(&request.utterance),
        };
        if classification.kind.is_mutation() {
            tracing::info!(
                intent = classification.kind.as_str(),
                "Mutating intent requires approval, not executed"
            );
        }

        let history = self.load_history();
        let exchange = self.append_turn(Role::User, &request.utterance, &turn_metadata(request));

        let knowledge = match scope {
            Some(scope) if request.knowledge_focus > 0 => Some(build_knowledge_snippet(
                self.documents.as_ref(),
                scope,
                self.knowledge_limit,
            )),
            _ => None,
        };

        let mut compose = ComposeRequest::new(
            &request.utterance,
            request.creativity,
            request.knowledge_focus,
        )
        .with_history(&history);
        if let Some(knowledge) = knowledge.as_deref() {
            compose = compose.with_knowledge(knowledge);
        }
        if let Some(scope) = scope {
            compose = compose.with_topic_instructions(&scope.constitution);
        }
        let composed = compose_context(&compose)?;

        let response =
            self.gateway
                .respond(&request.backend, &BackendRequest::from(&composed), cancel);
        // On fan-out the logged turn is the envelope text, so later history
        // carries no single backend's answer.
        self.append_turn(
            Role::Model,
            &response.answer,
            &Document::from_iter([("backend".to_string(), json!(response.provenance.backend_id))]),
        );

        let artifact = match (scope, &exchange, &self.capture) {
            (Some(scope), Some(exchange), Some(capture)) if response.is_success() => capture
                .capture_best_effort(
                    CaptureInput {
                        scope,
                        exchange,
                        utterance: &request.utterance,
                        response: &response,
                    },
                    cancel,
                ),
            _ => None,
        };

        let status = if response.is_success() { "success" } else { "degraded" };
        metrics::counter!(
            "chat_requests_total",
            "backend" => request.backend.clone(),
            "intent" => classification.kind.as_str(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!("chat_request_duration_ms", "backend" => request.backend.clone())
            .record(start.elapsed().as_secs_f64() * 1000.0);
        tracing::info!(
            intent = classification.kind.as_str(),
            status,
            captured = artifact.is_some(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Chat request completed"
        );

        Ok(ChatOutcome {
            response,
            weights: composed.weights,
            creativity: composed.creativity,
            classification,
            exchange,
            artifact,
        })
    }

    fn load_history(&self) -> Vec<Utterance> {
        if self.history_limit == 0 {
            return Vec::new();
        }
        self.log.recent(self.history_limit).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load conversation history");
            Vec::new()
        })
    }

    fn append_turn(&self, role: Role, text: &str, metadata: &Document) -> Option<ExchangeId> {
        match self.log.append(role, text, metadata) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(role = %role, error = %e, "Failed to append conversation turn");
                None
            },
        }
    }
}

fn validate(request: &ChatRequest) -> Result<()> {
    if request.utterance.trim().is_empty() {
        return Err(Error::InvalidInput("utterance must not be empty".to_string()));
    }
    if request.backend.trim().is_empty() {
        return Err(Error::InvalidInput("backend must not be empty".to_string()));
    }
    if !(0.0..=1.0).contains(&request.creativity) {
        return Err(Error::InvalidInput(format!(
            "creativity must be within [0, 1], got {}",
            request.creativity
        )));
    }
    if request.knowledge_focus > MAX_KNOWLEDGE_FOCUS {
        return Err(Error::InvalidInput(format!(
            "knowledge focus must be within 0..=100, got {}",
            request.knowledge_focus
        )));
    }
    Ok(())
}

fn turn_metadata(request: &ChatRequest) -> Document {
    let mut metadata = Document::new();
    metadata.insert("backend".to_string(), json!(request.backend));
    metadata.insert("creativity".to_string(), json!(request.creativity));
    metadata.insert("knowledge_focus".to_string(), json!(request.knowledge_focus));
    if let Some(scope) = &request.scope {
        metadata.insert("scope".to_string(), json!(scope));
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentKind;
    use crate::llm::{BackendEntry, ChatBackend, RetryConfig, RetryPolicy, Sleeper};
    use crate::models::{DEGRADED_ANSWER, FAN_OUT_ANSWER};
    use crate::storage::{MemoryConversationLog, MemoryDocumentStore};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const LONG_ANSWER: &str = "Land on the heel first because the heel strike sets the stride.";

    struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String>>>,
        seen: Mutex<Vec<BackendRequest>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn model(&self) -> &str {
            "scripted-1"
        }

        fn generate(&self, request: &BackendRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(r#"{"title": "Heel landing"}"#.to_string()))
        }
    }

    struct NoWait;

    impl Sleeper for NoWait {
        fn sleep(&self, _duration: Duration, _cancel: &CancelToken) -> bool {
            true
        }
    }

    struct Fixture {
        service: ChatService,
        backend: Arc<ScriptedBackend>,
        log: Arc<MemoryConversationLog>,
        documents: Arc<MemoryDocumentStore>,
    }

    fn fixture(replies: Vec<Result<String>>) -> Fixture {
        let backend = ScriptedBackend::new(replies);
        let gateway = Arc::new(
            BackendGateway::new(
                RetryPolicy::new(RetryConfig::default()).with_sleeper(Arc::new(NoWait)),
            )
            .with_backend(BackendEntry::new("gemini-flash", "Gemini Flash", backend.clone())),
        );
        let log = Arc::new(MemoryConversationLog::new());
        let documents = Arc::new(MemoryDocumentStore::new());
        let mut scopes = ScopeRegistry::new();
        scopes.register(TopicScope::new("balance_training", "Balance", "").unwrap());

        let capture = CaptureService::new(gateway.clone(), documents.clone(), log.clone());
        let service = ChatService::new(gateway, scopes, log.clone(), documents.clone())
            .with_capture(capture);
        Fixture {
            service,
            backend,
            log,
            documents,
        }
    }

    fn answer(text: &str) -> Result<String> {
        Ok(json!({"answer": text, "confidence": 0.8}).to_string())
    }

    #[test]
    fn test_unscoped_chat_logs_both_turns() {
        let f = fixture(vec![answer("A reset is a pause.")]);

        let outcome = f
            .service
            .respond(&ChatRequest::new("what is a reset?"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.response.answer, "A reset is a pause.");
        assert_eq!(outcome.classification.kind, IntentKind::Organize);
        assert!(outcome.artifact.is_none());
        assert_eq!(f.log.len(), 2);
        let turns = f.log.recent(10).unwrap();
        assert_eq!(turns[0].role(), Role::User);
        assert_eq!(turns[1].text(), "A reset is a pause.");

        let metadata = f.log.metadata(outcome.exchange.as_ref().unwrap()).unwrap();
        assert_eq!(metadata["backend"], "gemini-flash");
    }

    #[test]
    fn test_fan_out_logs_the_envelope_text() {
        let f = fixture(vec![answer("Heel first.")]);

        let outcome = f
            .service
            .respond(&ChatRequest::new("how do I land?").with_backend("all"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome.response.answer, FAN_OUT_ANSWER);
        let turns = f.log.recent(10).unwrap();
        assert_eq!(turns[1].text(), FAN_OUT_ANSWER);
        assert!(turns.iter().all(|turn| turn.text() != "Heel first."));
    }

    #[test]
    fn test_history_is_loaded_before_the_current_turn() {
        let f = fixture(vec![answer("first"), answer("second")]);
        let cancel = CancelToken::new();
        f.service.respond(&ChatRequest::new("earlier question"), &cancel).unwrap();
        f.service.respond(&ChatRequest::new("later question"), &cancel).unwrap();

        let seen = f.backend.seen.lock().unwrap();
        let message = &seen[1].message;
        assert!(message.contains("earlier question"));
        assert_eq!(message.matches("later question").count(), 1);
    }

    #[test]
    fn test_scoped_chat_captures_exchange() {
        let f = fixture(vec![answer(LONG_ANSWER)]);
        let request = ChatRequest::new("how should my foot land?")
            .with_scope("balance_training")
            .with_knowledge_focus(50);

        let outcome = f.service.respond(&request, &CancelToken::new()).unwrap();

        let artifact = outcome.artifact.unwrap();
        assert_eq!(artifact.title, "Heel landing");
        assert_eq!(Some(artifact.exchange_ref.clone()), outcome.exchange);
        assert!(f.log.is_captured(&artifact.exchange_ref).unwrap());
        assert_eq!(
            f.documents.list("balance_training", "raw", 10).unwrap().len(),
            1
        );

        let seen = f.backend.seen.lock().unwrap();
        assert!(seen[0].instructions.starts_with("Your name: Gemini Flash"));
        assert!(seen[0].message.contains("No topic knowledge has been recorded yet."));
    }

    #[test]
    fn test_mutating_intent_is_reported_not_executed() {
        let f = fixture(vec![answer("Noted.")]);
        let outcome = f
            .service
            .respond(
                &ChatRequest::new("delete the breathing notes from the db").with_scope("balance_training"),
                &CancelToken::new(),
            )
            .unwrap();

        assert_eq!(outcome.classification.kind, IntentKind::Delete);
        assert!(outcome.classification.parameters.requires_approval());
        assert!(f.documents.list("balance_training", "draft", 10).unwrap().is_empty());
    }

    #[test]
    fn test_backend_failure_degrades_without_capture() {
        let f = fixture(vec![Err(Error::OperationFailed {
            operation: "scripted_request".to_string(),
            cause: "API returned status: 400 Bad Request".to_string(),
        })]);

        let outcome = f
            .service
            .respond(
                &ChatRequest::new("how should my foot land?").with_scope("balance_training"),
                &CancelToken::new(),
            )
            .unwrap();

        assert!(outcome.response.answer.starts_with(DEGRADED_ANSWER));
        assert!(outcome.response.provenance.error.is_some());
        assert!(outcome.artifact.is_none());
        assert!(f.log.recent(10).unwrap()[1].text().starts_with(DEGRADED_ANSWER));
    }

    #[test]
    fn test_unknown_backend_degrades_locally() {
        let f = fixture(Vec::new());
        let outcome = f
            .service
            .respond(
                &ChatRequest::new("hello there").with_backend("missing"),
                &CancelToken::new(),
            )
            .unwrap();
        assert!(!outcome.response.is_success());
        assert!(f.backend.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_validation_errors() {
        let f = fixture(Vec::new());
        let cancel = CancelToken::new();

        assert!(matches!(
            f.service.respond(&ChatRequest::new("  "), &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.respond(&ChatRequest::new("hi").with_creativity(1.5), &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.respond(&ChatRequest::new("hi").with_knowledge_focus(101), &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            f.service.respond(&ChatRequest::new("hi").with_scope("unknown"), &cancel),
            Err(Error::NotFound(_))
        ));
        assert!(f.backend.seen.lock().unwrap().is_empty());
        assert!(f.log.is_empty());
    }

    #[test]
    fn test_create_scope_persists() {
        let mut f = fixture(Vec::new());
        f.service.create_scope("posture", "Posture", "").unwrap();
        assert!(f.service.scopes().get("posture").is_some());
        assert!(
            f.documents
                .get("_registry", "scopes", "posture")
                .unwrap()
                .is_some()
        );
    }
}
