//! Composite message assembly.

use super::instructions::build_instructions;
use super::weights::{ContextWeights, MAX_KNOWLEDGE_FOCUS, resolve_weights};
use crate::models::{Role, Utterance};
use crate::{Error, Result};
use serde::Serialize;

/// Most recent turns flattened into the composite message.
pub const MAX_HISTORY_TURNS: usize = 50;

/// Inputs to [`compose_context`].
#[derive(Debug, Clone, Copy)]
pub struct ComposeRequest<'a> {
    /// The current utterance.
    pub utterance: &'a str,
    /// Sampling creativity in `[0, 1]`.
    pub creativity: f64,
    /// Knowledge focus in `0..=100`.
    pub knowledge_focus: u8,
    /// Recent turns, oldest first.
    pub history: &'a [Utterance],
    /// Rendered topic knowledge, if any.
    pub knowledge: Option<&'a str>,
    /// The topic scope's constitution, if the exchange is scoped.
    pub topic_instructions: Option<&'a str>,
}

impl<'a> ComposeRequest<'a> {
    /// Creates a request with no history, knowledge, or scope.
    #[must_use]
    pub const fn new(utterance: &'a str, creativity: f64, knowledge_focus: u8) -> Self {
        Self {
            utterance,
            creativity,
            knowledge_focus,
            history: &[],
            knowledge: None,
            topic_instructions: None,
        }
    }

    /// Sets the recent exchange window.
    #[must_use]
    pub const fn with_history(mut self, history: &'a [Utterance]) -> Self {
        self.history = history;
        self
    }

    /// Sets the topic knowledge snippet.
    #[must_use]
    pub const fn with_knowledge(mut self, knowledge: &'a str) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    /// Sets the topic constitution.
    #[must_use]
    pub const fn with_topic_instructions(mut self, instructions: &'a str) -> Self {
        self.topic_instructions = Some(instructions);
        self
    }
}

/// What the gateway receives for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedContext {
    /// System-level instructions.
    pub instructions: String,
    /// The flattened composite message.
    pub message: String,
    /// Native history for the backend. Always empty: history is flattened
    /// into `message`.
    pub history: Vec<Utterance>,
    /// Creativity handed to the backend.
    pub creativity: f64,
    /// Weights used to label the sections.
    pub weights: ContextWeights,
}

/// Validates inputs and composes the instructions and composite message.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for an empty utterance, a creativity
/// outside `[0, 1]`, or a knowledge focus above 100.
pub fn compose_context(request: &ComposeRequest<'_>) -> Result<ComposedContext> {
    validate(request)?;

    let weights = resolve_weights(request.knowledge_focus);
    let instructions = build_instructions(request.topic_instructions, request.knowledge_focus);
    let message = flatten(request, weights);

    tracing::debug!(
        knowledge_focus = request.knowledge_focus,
        history_turns = request.history.len().min(MAX_HISTORY_TURNS),
        has_knowledge = request.knowledge.is_some_and(|k| !k.trim().is_empty()),
        message_len = message.len(),
        "Composed context"
    );

    Ok(ComposedContext {
        instructions,
        message,
        history: Vec::new(),
        creativity: request.creativity,
        weights,
    })
}

fn validate(request: &ComposeRequest<'_>) -> Result<()> {
    if request.utterance.trim().is_empty() {
        return Err(Error::InvalidInput("utterance must not be empty".to_string()));
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

const fn speaker(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Model => "Assistant",
    }
}

fn section_header(name: &str, weight: u8) -> String {
    format!("=== {name} (weight: {weight}%) ===")
}

fn flatten(request: &ComposeRequest<'_>, weights: ContextWeights) -> String {
    let mut parts: Vec<String> = Vec::new();

    let window_start = request.history.len().saturating_sub(MAX_HISTORY_TURNS);
    let window = &request.history[window_start..];
    if !window.is_empty() && weights.conversation > 0 {
        parts.push(section_header("Conversation", weights.conversation));
        parts.extend(
            window
                .iter()
                .map(|turn| format!("{}: {}", speaker(turn.role()), turn.text())),
        );
        parts.push(String::new());
    }

    if let Some(knowledge) = request.knowledge.filter(|k| !k.trim().is_empty())
        && weights.knowledge > 0
    {
        parts.push(section_header("Topic knowledge", weights.knowledge));
        parts.push(knowledge.trim_end().to_string());
        parts.push(String::new());
    }

    if weights.general > 0 {
        parts.push(section_header("General knowledge", weights.general));
        parts.push("Draw freely on general knowledge as well.".to_string());
        parts.push(String::new());
    }

    parts.push("=== Current question ===".to_string());
    parts.push(format!("{}: {}", speaker(Role::User), request.utterance.trim()));

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn history(turns: usize) -> Vec<Utterance> {
        (0..turns)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Model };
                Utterance::new(role, format!("turn-{i:03}"))
            })
            .collect()
    }

    #[test]
    fn test_sixty_turns_without_focus_keeps_last_fifty() {
        let turns = history(60);
        let composed =
            compose_context(&ComposeRequest::new("what next?", 0.7, 0).with_history(&turns))
                .unwrap();

        assert!(composed.message.contains("=== Conversation (weight: 100%) ==="));
        assert!(!composed.message.contains("turn-009"));
        assert!(composed.message.contains("turn-010"));
        assert!(composed.message.contains("turn-059"));
        let lines = composed
            .message
            .lines()
            .filter(|l| l.contains("turn-"))
            .count();
        assert_eq!(lines, MAX_HISTORY_TURNS);
        assert!(!composed.message.contains("Topic knowledge"));
        assert_eq!(composed.weights, ContextWeights::CONVERSATION_ONLY);
        assert!(composed.history.is_empty());
    }

    #[test]
    fn test_zero_focus_omits_knowledge_even_when_given() {
        let composed = compose_context(
            &ComposeRequest::new("what next?", 0.7, 0).with_knowledge("[FINAL] Warm-up: slow"),
        )
        .unwrap();
        assert!(!composed.message.contains("[FINAL]"));
    }

    #[test]
    fn test_focused_request_labels_both_sections() {
        let turns = history(2);
        let composed = compose_context(
            &ComposeRequest::new("and the cooldown?", 0.3, 40)
                .with_history(&turns)
                .with_knowledge("[FINAL] Warm-up: slow")
                .with_topic_instructions("You curate balance notes."),
        )
        .unwrap();

        let conversation = composed
            .message
            .find("=== Conversation (weight: 30%) ===")
            .unwrap();
        let knowledge = composed
            .message
            .find("=== Topic knowledge (weight: 70%) ===")
            .unwrap();
        let question = composed.message.find("=== Current question ===").unwrap();
        assert!(conversation < knowledge && knowledge < question);
        assert!(composed.message.ends_with("User: and the cooldown?"));
        assert!(!composed.message.contains("General knowledge"));
        assert!(composed.instructions.starts_with("You curate balance notes."));
    }

    #[test]
    fn test_question_section_always_present() {
        let composed = compose_context(&ComposeRequest::new("hi", 0.5, 0)).unwrap();
        assert_eq!(composed.message, "=== Current question ===\nUser: hi");
    }

    #[test]
    fn test_creativity_passes_through() {
        let composed = compose_context(&ComposeRequest::new("hi", 0.93, 100)).unwrap();
        assert!((composed.creativity - 0.93).abs() < f64::EPSILON);
    }

    #[test_case("", 0.5, 0 ; "empty utterance")]
    #[test_case("  \n", 0.5, 0 ; "blank utterance")]
    #[test_case("hi", -0.1, 0 ; "creativity below range")]
    #[test_case("hi", 1.5, 0 ; "creativity above range")]
    #[test_case("hi", f64::NAN, 0 ; "creativity nan")]
    #[test_case("hi", 0.5, 101 ; "focus above range")]
    fn test_invalid_inputs(utterance: &str, creativity: f64, focus: u8) {
        let result = compose_context(&ComposeRequest::new(utterance, creativity, focus));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
