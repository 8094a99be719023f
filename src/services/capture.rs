//! Capture service.
//!
//! Stages successful in-scope exchanges into the scope's source collection.

use crate::capture::{
    ArtifactMetadata, GateRejection, check_gate, extraction_request, parse_metadata,
    score_exchange,
};
use crate::llm::{BackendGateway, CancelToken, FAN_OUT_ID};
use crate::models::{
    ArtifactId, ArtifactIdGenerator, CapturedArtifact, ExchangeId, Stage, StructuredResponse,
};
use crate::scope::TopicScope;
use crate::storage::{ConversationLog, Document, DocumentStore};
use crate::{Error, Result};
use chrono::Utc;
use serde_json::{Value, json};
use std::sync::Arc;

/// Status written on every source document.
pub const SOURCE_STATUS: &str = "SOURCE";

/// Why an exchange was not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The response carries a failure.
    UnsuccessfulResponse,
    /// Fan-out envelopes have no single answer to capture.
    FanOut,
    /// The exchange was captured before.
    AlreadyCaptured,
    /// The hard gate rejected the exchange.
    Gate(GateRejection),
}

/// Result of a capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// The artifact was written.
    Captured(Box<CapturedArtifact>),
    /// Nothing was written.
    Skipped(SkipReason),
}

/// One exchange offered for capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureInput<'a> {
    /// Scope the exchange happened in.
    pub scope: &'a TopicScope,
    /// The user turn the exchange is keyed by.
    pub exchange: &'a ExchangeId,
    /// The user's utterance.
    pub utterance: &'a str,
    /// The validated response.
    pub response: &'a StructuredResponse,
}

/// Listing view of a source document.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CaptureSummary {
    /// Document id.
    pub id: String,
    /// Title, through the scope's aliases.
    pub title: String,
    /// Quality score; absent on manual saves.
    pub quality_score: Option<u8>,
    /// Review flag; false on manual saves.
    pub needs_review: bool,
}

/// Service for capturing exchanges.
pub struct CaptureService {
    gateway: Arc<BackendGateway>,
    documents: Arc<dyn DocumentStore>,
    log: Arc<dyn ConversationLog>,
    ids: ArtifactIdGenerator,
    metadata_backend: Option<String>,
}

impl CaptureService {
    /// Creates a capture service.
    #[must_use]
    pub fn new(
        gateway: Arc<BackendGateway>,
        documents: Arc<dyn DocumentStore>,
        log: Arc<dyn ConversationLog>,
    ) -> Self {
        Self {
            gateway,
            documents,
            log,
            ids: ArtifactIdGenerator::new(),
            metadata_backend: None,
        }
    }

    /// Uses a fixed backend for metadata extraction instead of the backend
    /// that answered.
    #[must_use]
    pub fn with_metadata_backend(mut self, backend: impl Into<String>) -> Self {
        self.metadata_backend = Some(backend.into());
        self
    }

    /// Runs the capture pipeline for one exchange.
    ///
    /// The idempotency check and the capture flag are not atomic: two
    /// concurrent captures of the same exchange can both write.
    ///
    /// # Errors
    ///
    /// Returns an error if the log or the document store fails.
    pub fn capture(&self, input: CaptureInput<'_>, cancel: &CancelToken) -> Result<CaptureOutcome> {
        let CaptureInput {
            scope,
            exchange,
            utterance,
            response,
        } = input;

        if !response.is_success() {
            return Ok(self.skip(scope, SkipReason::UnsuccessfulResponse));
        }
        if response.provenance.backend_id == FAN_OUT_ID {
            return Ok(self.skip(scope, SkipReason::FanOut));
        }
        if self.log.is_captured(exchange)? {
            return Ok(self.skip(scope, SkipReason::AlreadyCaptured));
        }
        if let Err(rejection) = check_gate(utterance, &response.answer) {
            return Ok(self.skip(scope, SkipReason::Gate(rejection)));
        }

        let metadata = self.extract_metadata(utterance, response, cancel);
        let report = score_exchange(utterance, &response.answer);
        let artifact = CapturedArtifact {
            id: self.ids.next_id(),
            scope_id: scope.id.clone(),
            title: metadata.title,
            source_utterance: utterance.to_string(),
            raw_response: response.answer.clone(),
            keywords: metadata.keywords,
            category: metadata.category,
            summary: metadata.summary,
            quality_score: report.score,
            quality_issues: report.issues,
            needs_review: report.needs_review,
            exchange_ref: exchange.clone(),
            backend_id: response.provenance.backend_id.clone(),
            created_at: Utc::now(),
        };

        let stage = scope.stage_name(Stage::Source);
        self.documents.append(
            &scope.id,
            stage,
            artifact.id.as_str(),
            &artifact_document(scope, &artifact),
        )?;
        let location = format!("{}/{stage}/{}", scope.id, artifact.id);
        self.log.mark_captured(exchange, &location)?;

        tracing::info!(
            scope = %scope.id,
            artifact = %artifact.id,
            quality_score = artifact.quality_score,
            needs_review = artifact.needs_review,
            "Captured exchange"
        );
        metrics::counter!("capture_total", "scope" => scope.id.clone(), "outcome" => "captured")
            .increment(1);
        Ok(CaptureOutcome::Captured(Box::new(artifact)))
    }

    /// Runs [`capture`](Self::capture), logging and swallowing any failure.
    pub fn capture_best_effort(
        &self,
        input: CaptureInput<'_>,
        cancel: &CancelToken,
    ) -> Option<CapturedArtifact> {
        match self.capture(input, cancel) {
            Ok(CaptureOutcome::Captured(artifact)) => Some(*artifact),
            Ok(CaptureOutcome::Skipped(_)) => None,
            Err(e) => {
                tracing::warn!(scope = %input.scope.id, exchange = %input.exchange, error = %e, "Capture failed");
                metrics::counter!("capture_total", "scope" => input.scope.id.clone(), "outcome" => "error")
                    .increment(1);
                None
            },
        }
    }

    /// Writes a curator-supplied source document and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for empty content, or a store error.
    pub fn save_manual(
        &self,
        scope: &TopicScope,
        title: &str,
        category: &str,
        content: &str,
    ) -> Result<ArtifactId> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("content must not be empty".to_string()));
        }
        let id = self.ids.next_id();
        let mut document = Document::new();
        document.insert(scope.field_name("title").to_string(), json!(title.trim()));
        document.insert(scope.field_name("category").to_string(), json!(category.trim()));
        document.insert(scope.field_name("content").to_string(), json!(content));
        document.insert(scope.field_name("status").to_string(), json!(SOURCE_STATUS));
        document.insert(
            scope.field_name("created_at").to_string(),
            json!(Utc::now().to_rfc3339()),
        );

        self.documents
            .append(&scope.id, scope.stage_name(Stage::Source), id.as_str(), &document)?;
        tracing::info!(scope = %scope.id, artifact = %id, "Saved manual source document");
        Ok(id)
    }

    /// Lists source documents, newest first.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub fn list_captures(&self, scope: &TopicScope, limit: usize) -> Result<Vec<CaptureSummary>> {
        let documents = self
            .documents
            .list(&scope.id, scope.stage_name(Stage::Source), limit)?;
        Ok(documents
            .into_iter()
            .map(|document| CaptureSummary {
                title: document
                    .str_field(scope.field_name("title"))
                    .unwrap_or_default()
                    .to_string(),
                quality_score: document
                    .fields
                    .get("quality_score")
                    .and_then(Value::as_u64)
                    .and_then(|score| u8::try_from(score).ok()),
                needs_review: document
                    .fields
                    .get("needs_review")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                id: document.id,
            })
            .collect())
    }

    fn skip(&self, scope: &TopicScope, reason: SkipReason) -> CaptureOutcome {
        tracing::debug!(scope = %scope.id, reason = ?reason, "Skipped capture");
        let label = match reason {
            SkipReason::UnsuccessfulResponse => "unsuccessful",
            SkipReason::FanOut => "fan_out",
            SkipReason::AlreadyCaptured => "already_captured",
            SkipReason::Gate(rejection) => rejection.as_str(),
        };
        metrics::counter!("capture_total", "scope" => scope.id.clone(), "outcome" => label)
            .increment(1);
        CaptureOutcome::Skipped(reason)
    }

    fn extract_metadata(
        &self,
        utterance: &str,
        response: &StructuredResponse,
        cancel: &CancelToken,
    ) -> ArtifactMetadata {
        let backend = self
            .metadata_backend
            .as_deref()
            .unwrap_or(&response.provenance.backend_id);
        let request = extraction_request(utterance, &response.answer);
        match self.gateway.generate_raw(backend, &request, cancel) {
            Ok(raw) => parse_metadata(&raw, &self.gateway.display_names()),
            Err(e) => {
                tracing::warn!(backend = %backend, error = %e, "Metadata extraction failed, using defaults");
                ArtifactMetadata::default()
            },
        }
    }
}

/// Encodes an artifact with the scope's field aliases.
fn artifact_document(scope: &TopicScope, artifact: &CapturedArtifact) -> Document {
    let mut document = Document::new();
    let mut put = |key: &str, value: Value| {
        document.insert(scope.field_name(key).to_string(), value);
    };
    put("title", json!(artifact.title));
    put("source_utterance", json!(artifact.source_utterance));
    put("raw_response", json!(artifact.raw_response));
    put("content", json!(artifact.raw_response));
    put("category", json!(artifact.category));
    put("status", json!(SOURCE_STATUS));
    put("created_at", json!(artifact.created_at.to_rfc3339()));
    document.insert("id".to_string(), json!(artifact.id));
    document.insert("keywords".to_string(), json!(artifact.keywords));
    document.insert("summary".to_string(), json!(artifact.summary));
    document.insert("quality_score".to_string(), json!(artifact.quality_score));
    document.insert("quality_issues".to_string(), json!(artifact.quality_issues));
    document.insert("needs_review".to_string(), json!(artifact.needs_review));
    document.insert("exchange_ref".to_string(), json!(artifact.exchange_ref));
    document.insert("backend_id".to_string(), json!(artifact.backend_id));
    document.insert("scope_id".to_string(), json!(artifact.scope_id));
    document
}
