//! Instruction blocks handed to the backend alongside the composite message.

/// Instructions for exchanges outside any topic scope.
pub const GENERAL_INSTRUCTIONS: &str = "\
You are a creative thinking partner helping the user develop raw ideas.

Core principles:
- Address the user directly in the second person.
- Keep the conversation thread: \"that\", \"it\", and \"earlier\" refer to the most recent topic.
- Never fabricate facts, sources, or prior statements.
- When unsure, say so explicitly (\"I'm not certain, but...\").
- Prefer concrete, practical suggestions over generalities.";

/// Appended to scope instructions when knowledge focus is zero.
pub const CONVERSATION_PRIORITY_BLOCK: &str = "\
[Conversation mode]
- The conversation history matters most (100%).
- Continue the topic of the previous exchange.
- When the user only says \"that\" or names an effect, resolve it against the previous exchange.";

/// Appended to scope instructions when knowledge focus is non-zero.
pub const KNOWLEDGE_PRIORITY_BLOCK: &str = "\
[Topic knowledge mode]
- Prefer the topic knowledge over general knowledge.
- State when the source lacks an answer instead of filling the gap.
- Do not mix topic knowledge with general knowledge.";

/// Builds the instruction text for one request.
///
/// Without topic instructions the general set is used verbatim. With them,
/// the constitution is followed by the block matching the knowledge focus.
#[must_use]
pub fn build_instructions(topic_instructions: Option<&str>, knowledge_focus: u8) -> String {
    let Some(constitution) = topic_instructions.filter(|c| !c.trim().is_empty()) else {
        return GENERAL_INSTRUCTIONS.to_string();
    };

    let block = if knowledge_focus > 0 {
        KNOWLEDGE_PRIORITY_BLOCK
    } else {
        CONVERSATION_PRIORITY_BLOCK
    };
    format!("{}\n\n{block}", constitution.trim_end())
}
