//! Hard gate deciding whether an exchange is worth capturing.

use crate::models::DEGRADED_ANSWER;
use std::fmt;

/// Replies with fewer non-whitespace characters are rejected.
pub const MIN_REPLY_CONTENT_CHARS: usize = 10;

/// Utterances that are only an acknowledgement, compared after stripping
/// punctuation and lower-casing.
pub const ACKNOWLEDGEMENTS: &[&str] = &[
    "hi",
    "hello",
    "thanks",
    "thank you",
    "ok",
    "okay",
    "yes",
    "yep",
    "lol",
    "안녕",
    "고마워",
    "감사",
    "좋아",
    "알겠어",
    "응",
    "ㅇㅇ",
    "넵",
    "오케이",
    "ㅋㅋㅋ",
    "ㅎㅎㅎ",
    "ㄱㅅ",
];

/// Fragments that mark a reply as an upstream error echo.
const ERROR_ECHO_MARKERS: &[&str] = &[
    "api returned status",
    "request cancelled",
    "internal server error",
    "오류가 발생",
];

/// Why an exchange was not captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// The reply is empty or nearly so.
    EmptyReply,
    /// The reply repeats an upstream failure.
    ErrorEcho,
    /// The utterance is a bare acknowledgement.
    Acknowledgement,
}

impl GateRejection {
    /// Short machine-readable reason.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyReply => "empty_reply",
            Self::ErrorEcho => "error_echo",
            Self::Acknowledgement => "acknowledgement",
        }
    }
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an utterance is exactly one of [`ACKNOWLEDGEMENTS`].
#[must_use]
pub fn is_acknowledgement(utterance: &str) -> bool {
    let stripped: String = utterance
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    let normalized = stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    ACKNOWLEDGEMENTS.contains(&normalized.as_str())
}

/// `error:`, `error -` or `[error]` at the start; "Errors in gait" is prose.
fn has_error_prefix(lower: &str) -> bool {
    let rest = lower.strip_prefix('[').unwrap_or(lower);
    rest.strip_prefix("error")
        .is_some_and(|tail| tail.trim_start().starts_with([':', '-', ']']))
}

fn is_error_echo(reply: &str) -> bool {
    let lower = reply.trim().to_lowercase();
    has_error_prefix(&lower)
        || lower.starts_with(&DEGRADED_ANSWER.to_lowercase())
        || ERROR_ECHO_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Applies the hard filter. Everything not rejected is accepted.
///
/// # Errors
///
/// Returns the [`GateRejection`] that stopped the exchange.
pub fn check_gate(utterance: &str, reply: &str) -> Result<(), GateRejection> {
    let content_chars = reply.chars().filter(|c| !c.is_whitespace()).count();
    if content_chars < MIN_REPLY_CONTENT_CHARS {
        return Err(GateRejection::EmptyReply);
    }
    if is_error_echo(reply) {
        return Err(GateRejection::ErrorEcho);
    }
    if is_acknowledgement(utterance) {
        return Err(GateRejection::Acknowledgement);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const REPLY: &str = "Shift your weight onto the heel first, then roll forward.";

    #[test_case("thanks!" ; "english with punctuation")]
    #[test_case("  Thank   you. " ; "spacing and case")]
    #[test_case("ㅋㅋㅋ" ; "laughter")]
    #[test_case("고마워~" ; "korean with tilde")]
    #[test_case("OK" ; "upper case")]
    fn test_acknowledgements_are_rejected(utterance: &str) {
        assert_eq!(
            check_gate(utterance, REPLY),
            Err(GateRejection::Acknowledgement)
        );
    }

    #[test_case("thanks, but why does the heel go first?" ; "acknowledgement plus question")]
    #[test_case("ok so how long should I hold it" ; "follow up")]
    fn test_acknowledgement_prefix_is_accepted(utterance: &str) {
        assert_eq!(check_gate(utterance, REPLY), Ok(()));
    }

    #[test_case("" ; "empty")]
    #[test_case("  \n " ; "whitespace")]
    #[test_case("Sure.  ok" ; "too short")]
    fn test_near_empty_replies_are_rejected(reply: &str) {
        assert_eq!(
            check_gate("how do I reset my gait?", reply),
            Err(GateRejection::EmptyReply)
        );
    }

    #[test_case("Error: upstream model failed to respond" ; "error prefix")]
    #[test_case("The response service is temporarily unavailable. (503)" ; "degraded answer")]
    #[test_case("Sorry, API returned status: 429 Too Many Requests" ; "status echo")]
    #[test_case("[ERROR] backend unreachable" ; "bracketed prefix")]
    fn test_error_echoes_are_rejected(reply: &str) {
        assert_eq!(
            check_gate("how do I reset my gait?", reply),
            Err(GateRejection::ErrorEcho)
        );
    }

    #[test_case("Errors in gait usually come from rushing the heel strike, so slow down." ; "plural")]
    #[test_case("Erroneous cues are common early on; keep the pelvis level." ; "adjective")]
    fn test_replies_starting_with_error_words_pass(reply: &str) {
        assert_eq!(check_gate("why do I keep stumbling?", reply), Ok(()));
    }

    #[test]
    fn test_rejection_display() {
        assert_eq!(GateRejection::ErrorEcho.to_string(), "error_echo");
    }
}
