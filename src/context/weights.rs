//! Context weight resolution.

use serde::Serialize;

/// Highest accepted knowledge-focus value.
pub const MAX_KNOWLEDGE_FOCUS: u8 = 100;

/// Conversation share whenever topic knowledge is in play.
const FOCUSED_CONVERSATION_SHARE: u8 = 30;

/// Knowledge share whenever topic knowledge is in play.
const FOCUSED_KNOWLEDGE_SHARE: u8 = 70;

/// Relative importance of each context source, in percent.
///
/// The shares label sections of the composite message; they never truncate
/// content. `conversation == 100` holds exactly when knowledge focus is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ContextWeights {
    /// Share of the recent exchange window.
    pub conversation: u8,
    /// Share of the topic knowledge snippet.
    pub knowledge: u8,
    /// Share of the backend's general knowledge.
    pub general: u8,
}

impl ContextWeights {
    /// Conversation only.
    pub const CONVERSATION_ONLY: Self = Self {
        conversation: 100,
        knowledge: 0,
        general: 0,
    };

    /// Knowledge-led split.
    pub const KNOWLEDGE_LED: Self = Self {
        conversation: FOCUSED_CONVERSATION_SHARE,
        knowledge: FOCUSED_KNOWLEDGE_SHARE,
        general: 0,
    };
}

impl Default for ContextWeights {
    fn default() -> Self {
        Self::CONVERSATION_ONLY
    }
}

/// Maps a knowledge-focus value to weights.
///
/// This is a step function with no interpolation: any non-zero focus selects
/// [`ContextWeights::KNOWLEDGE_LED`].
#[must_use]
pub const fn resolve_weights(knowledge_focus: u8) -> ContextWeights {
    if knowledge_focus == 0 {
        ContextWeights::CONVERSATION_ONLY
    } else {
        ContextWeights::KNOWLEDGE_LED
    }
}

/// Alternative creativity curve, inversely proportional to knowledge focus.
///
/// Maps focus `0..=100` onto `0.7..=0.2`, rounded to two decimals. Not used by
/// the composer, which passes the caller's creativity through unchanged.
#[must_use]
pub fn inverse_creativity_curve(knowledge_focus: u8) -> f64 {
    let focus = f64::from(knowledge_focus.min(MAX_KNOWLEDGE_FOCUS));
    let value = 0.5f64.mul_add(-(focus / 100.0), 0.7);
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_focus_is_conversation_only() {
        assert_eq!(resolve_weights(0), ContextWeights::CONVERSATION_ONLY);
        assert_eq!(resolve_weights(0).conversation, 100);
    }

    #[test]
    fn test_every_nonzero_focus_is_the_same_split() {
        for focus in 1..=MAX_KNOWLEDGE_FOCUS {
            let weights = resolve_weights(focus);
            assert_eq!(
                (weights.conversation, weights.knowledge, weights.general),
                (30, 70, 0),
                "focus {focus}"
            );
        }
    }

    #[test]
    fn test_inverse_curve_endpoints() {
        assert!((inverse_creativity_curve(0) - 0.7).abs() < 1e-9);
        assert!((inverse_creativity_curve(50) - 0.45).abs() < 1e-9);
        assert!((inverse_creativity_curve(100) - 0.2).abs() < 1e-9);
    }
}
