//! `chat` and `classify` commands.

use super::output::{OutputFormat, write_as};
use crate::intent::ClassificationResult;
use crate::llm::CancelToken;
use crate::models::FanOutResult;
use crate::services::{ChatOutcome, ChatRequest, ChatService};
use std::io::{self, Write};
use std::time::Duration;

/// Arguments of the `chat` command.
#[derive(Debug, Clone)]
pub struct ChatArgs {
    /// The utterance.
    pub utterance: String,
    /// Backend id; the configured default when unset.
    pub backend: Option<String>,
    /// Topic scope id.
    pub scope: Option<String>,
    /// Creativity in `[0, 1]`.
    pub creativity: f64,
    /// Knowledge focus in `0..=100`.
    pub focus: u8,
    /// Overall deadline for the request, retries included.
    pub timeout_secs: Option<u64>,
}

impl ChatArgs {
    /// Builds the service request.
    #[must_use]
    pub fn to_request(&self, default_backend: &str) -> ChatRequest {
        let mut request = ChatRequest::new(self.utterance.clone())
            .with_backend(self.backend.as_deref().unwrap_or(default_backend))
            .with_creativity(self.creativity)
            .with_knowledge_focus(self.focus);
        if let Some(scope) = &self.scope {
            request = request.with_scope(scope.clone());
        }
        request
    }

    /// Builds the cancel token for the request.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.timeout_secs
            .map_or_else(CancelToken::new, |secs| {
                CancelToken::with_timeout(Duration::from_secs(secs))
            })
    }
}

/// Writes a chat outcome as text.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_outcome_text<W: Write>(writer: &mut W, outcome: &ChatOutcome) -> io::Result<()> {
    let response = &outcome.response;
    match &response.responses {
        Some(results) => {
            writeln!(writer, "{}", response.answer)?;
            for (backend, result) in results {
                writeln!(writer)?;
                writeln!(writer, "[{backend}]")?;
                match result {
                    FanOutResult::Response(inner) => writeln!(writer, "{}", inner.answer)?,
                    FanOutResult::Error { error } => writeln!(writer, "error: {error}")?,
                }
            }
        },
        None => writeln!(writer, "{}", response.answer)?,
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "backend: {}  confidence: {:.2}  creativity: {:.2}",
        response.provenance.backend_id, response.confidence, outcome.creativity
    )?;
    writeln!(
        writer,
        "weights: conversation {}% / knowledge {}% / general {}%",
        outcome.weights.conversation, outcome.weights.knowledge, outcome.weights.general
    )?;
    write_classification_text(writer, &outcome.classification)?;
    if let Some(error) = &response.provenance.error {
        writeln!(writer, "error: {error}")?;
    }
    if let Some(artifact) = &outcome.artifact {
        writeln!(
            writer,
            "captured: {} (score {}{})",
            artifact.id,
            artifact.quality_score,
            if artifact.needs_review { ", needs review" } else { "" }
        )?;
    }
    Ok(())
}

/// Writes a classification as text.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_classification_text<W: Write>(
    writer: &mut W,
    classification: &ClassificationResult,
) -> io::Result<()> {
    write!(
        writer,
        "intent: {} ({:.2})",
        classification.kind.as_str(),
        classification.confidence
    )?;
    if classification.parameters.requires_approval() {
        write!(writer, "  requires approval, not executed")?;
    }
    writeln!(writer)
}

/// Executes the chat command.
///
/// # Errors
///
/// Returns an error for invalid arguments or if output fails.
pub fn cmd_chat(
    service: &ChatService,
    args: &ChatArgs,
    default_backend: &str,
    cancel: &CancelToken,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = service.respond(&args.to_request(default_backend), cancel)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_as(&mut handle, format, &outcome, write_outcome_text)
}

/// Executes the classify command.
///
/// # Errors
///
/// Returns an error for an unknown scope or if output fails.
pub fn cmd_classify(
    service: &ChatService,
    utterance: &str,
    scope: Option<&str>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let classification = service.classify(utterance, scope)?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_as(&mut handle, format, &classification, write_classification_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextWeights;
    use crate::intent::classify;
    use crate::models::{Provenance, StructuredResponse};
    use std::collections::BTreeMap;

    fn outcome(response: StructuredResponse, utterance: &str) -> ChatOutcome {
        ChatOutcome {
            response,
            weights: ContextWeights::CONVERSATION_ONLY,
            creativity: 0.7,
            classification: classify(utterance),
            exchange: None,
            artifact: None,
        }
    }

    fn render(outcome: &ChatOutcome) -> String {
        let mut buffer = Vec::new();
        write_outcome_text(&mut buffer, outcome).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_text_output_has_answer_weights_and_intent() {
        let text = render(&outcome(
            StructuredResponse::new("Pause and breathe.", Provenance::new("gpt", "gpt-4o")),
            "what is a reset?",
        ));
        assert!(text.starts_with("Pause and breathe.\n"));
        assert!(text.contains("backend: gpt"));
        assert!(text.contains("conversation 100%"));
        assert!(text.contains("intent: ORGANIZE"));
    }

    #[test]
    fn test_fan_out_lists_each_backend() {
        let envelope = StructuredResponse::fan_out(BTreeMap::from([
            (
                "claude".to_string(),
                FanOutResult::Response(StructuredResponse::new(
                    "Heel first.",
                    Provenance::new("claude", "haiku"),
                )),
            ),
            (
                "gpt".to_string(),
                FanOutResult::Error {
                    error: "backend 'gpt' is disabled".to_string(),
                },
            ),
        ]));
        let text = render(&outcome(envelope, "how do I land?"));
        assert!(text.contains("[claude]\nHeel first."));
        assert!(text.contains("[gpt]\nerror: backend 'gpt' is disabled"));
    }

    #[test]
    fn test_mutation_is_marked() {
        let mut buffer = Vec::new();
        write_classification_text(&mut buffer, &classify("delete the old notes from the db"))
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("DELETE"));
        assert!(text.contains("requires approval"));
    }

    #[test]
    fn test_args_fall_back_to_default_backend() {
        let args = ChatArgs {
            utterance: "hello".to_string(),
            backend: None,
            scope: Some("balance_training".to_string()),
            creativity: 0.4,
            focus: 30,
            timeout_secs: Some(5),
        };
        let request = args.to_request("claude");
        assert_eq!(request.backend, "claude");
        assert_eq!(request.scope.as_deref(), Some("balance_training"));
        assert_eq!(request.knowledge_focus, 30);
        assert!(!args.cancel_token().is_cancelled());
    }
}
