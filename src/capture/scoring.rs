//! Heuristic quality scoring of captured exchanges.
//!
//! | Rule | Deduction |
//! |------|-----------|
//! | More than 5 utterance keywords missing from the reply | 2 per missing keyword |
//! | 3 or more generic phrases | 10 per phrase past the second |
//! | Reply shorter than 300 characters | 30 |
//! | Structural marker absent (paragraph break, list item, summary line) | 15 each |
//! | No causal or directional connective | 20 |
//!
//! The score starts at 100 and never drops below 0. It only flags an artifact
//! for review; it never blocks capture.
// Allow expect() on static regex patterns - these are guaranteed to compile
#![allow(clippy::expect_used)]

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

/// Starting score.
pub const MAX_SCORE: u8 = 100;

/// Scores below this flag the artifact for review.
pub const REVIEW_THRESHOLD: u8 = 60;

/// Replies shorter than this (in characters) lose [`SHORT_REPLY_PENALTY`].
pub const MIN_REPLY_CHARS: usize = 300;

/// Deduction for a short reply.
pub const SHORT_REPLY_PENALTY: u32 = 30;

/// Deduction per missing keyword, once past [`KEYWORD_ALLOWANCE`].
pub const MISSING_KEYWORD_PENALTY: u32 = 2;

/// Missing keywords tolerated without deduction.
pub const KEYWORD_ALLOWANCE: usize = 5;

/// Utterance words must be longer than this to count as keywords.
pub const MIN_KEYWORD_CHARS: usize = 2;

/// Deduction per generic phrase past the tolerated count.
pub const GENERIC_PHRASE_PENALTY: u32 = 10;

/// Generic phrase hits at which deductions start.
pub const GENERIC_PHRASE_THRESHOLD: usize = 3;

/// Deduction per missing structural marker.
pub const MISSING_MARKER_PENALTY: u32 = 15;

/// Deduction when no connective appears.
pub const NO_CONNECTIVE_PENALTY: u32 = 20;

/// Stock phrases that signal a generic, non-grounded answer.
pub const GENERIC_PHRASES: &[&str] = &[
    "in general",
    "generally speaking",
    "typically",
    "it depends",
    "accessibility",
    "cost efficiency",
    "competitiveness",
    "viability",
    "partnership",
    "gamification",
    "user experience",
    "multiple meanings",
    "various interpretations",
    "depending on context",
    "일반적으로",
    "보통",
    "대체로",
    "흔히",
    "전형적으로",
    "접근성",
    "비용 효율",
    "경쟁력",
    "생존 가능성",
    "파트너십",
    "게임 요소",
    "사용자 경험",
    "여러 의미",
    "다양한 해석",
    "맥락에 따라",
];

/// Causal or directional connectives.
pub const CONNECTIVES: &[&str] = &[
    "because",
    "therefore",
    "so that",
    "as a result",
    "which means",
    "leads to",
    "in order to",
    "thus",
    "hence",
    "때문에",
    "그래서",
    "따라서",
    "그러므로",
    "결과적으로",
    "덕분에",
    "위해",
    "하므로",
];

/// Line openers that mark a summary line.
const SUMMARY_OPENERS: &[&str] = &[
    "summary",
    "in summary",
    "in short",
    "to sum up",
    "bottom line",
    "key takeaway",
    "요약",
    "정리",
    "결론",
    "핵심",
];

static KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w가-힣]+").expect("static regex: keyword"));

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+\S").expect("static regex: list item")
});

/// Outcome of scoring one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityReport {
    /// Score in `[0, 100]`.
    pub score: u8,
    /// One entry per rule that deducted.
    pub issues: Vec<String>,
    /// `score < 60`.
    pub needs_review: bool,
}

/// Distinct utterance keywords longer than two characters.
#[must_use]
pub fn utterance_keywords(utterance: &str) -> BTreeSet<String> {
    let lower = utterance.to_lowercase();
    KEYWORD
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|word| word.chars().count() > MIN_KEYWORD_CHARS)
        .map(ToString::to_string)
        .collect()
}

/// Number of distinct generic phrases in a reply.
#[must_use]
pub fn generic_phrase_hits(reply: &str) -> usize {
    let lower = reply.to_lowercase();
    GENERIC_PHRASES
        .iter()
        .filter(|phrase| lower.contains(*phrase))
        .count()
}

fn has_paragraph_break(reply: &str) -> bool {
    reply.replace("\r\n", "\n").contains("\n\n")
}

fn has_list_item(reply: &str) -> bool {
    LIST_ITEM.is_match(reply)
}

fn has_summary_line(reply: &str) -> bool {
    reply.lines().any(|line| {
        let line = line
            .trim_start_matches(|c: char| c.is_whitespace() || "-*•#>".contains(c))
            .to_lowercase();
        SUMMARY_OPENERS.iter().any(|opener| line.starts_with(opener))
    })
}

fn has_connective(reply: &str) -> bool {
    let lower = reply.to_lowercase();
    CONNECTIVES.iter().any(|c| lower.contains(c))
}

/// Scores an exchange.
#[must_use]
pub fn score_exchange(utterance: &str, reply: &str) -> QualityReport {
    let mut deduction: u32 = 0;
    let mut issues = Vec::new();
    let lower_reply = reply.to_lowercase();

    let missing = utterance_keywords(utterance)
        .iter()
        .filter(|keyword| !lower_reply.contains(keyword.as_str()))
        .count();
    if missing > KEYWORD_ALLOWANCE {
        deduction += MISSING_KEYWORD_PENALTY * u32::try_from(missing).unwrap_or(u32::MAX / 4);
        issues.push(format!("{missing} utterance keywords missing from reply"));
    }

    let generic = generic_phrase_hits(reply);
    if generic >= GENERIC_PHRASE_THRESHOLD {
        let counted = generic - (GENERIC_PHRASE_THRESHOLD - 1);
        deduction += GENERIC_PHRASE_PENALTY * u32::try_from(counted).unwrap_or(u32::MAX / 16);
        issues.push(format!("{generic} generic phrases"));
    }

    if reply.chars().count() < MIN_REPLY_CHARS {
        deduction += SHORT_REPLY_PENALTY;
        issues.push("reply too short".to_string());
    }

    for (present, marker) in [
        (has_paragraph_break(reply), "paragraph break"),
        (has_list_item(reply), "list item"),
        (has_summary_line(reply), "summary line"),
    ] {
        if !present {
            deduction += MISSING_MARKER_PENALTY;
            issues.push(format!("no {marker}"));
        }
    }

    if !has_connective(reply) {
        deduction += NO_CONNECTIVE_PENALTY;
        issues.push("no causal or directional connective".to_string());
    }

    let score = u8::try_from(u32::from(MAX_SCORE).saturating_sub(deduction)).unwrap_or(0);
    QualityReport {
        score,
        issues,
        needs_review: score < REVIEW_THRESHOLD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A well-formed reply that triggers no rule.
    fn structured_reply() -> String {
        let body = "Shift your weight onto the heel first, because the heel strike \
                    sets the rhythm for the whole stride and the hips follow it.\n\n\
                    - Stand tall and exhale slowly.\n\
                    - Roll from heel to toe over two counts.\n\
                    - Let the arms swing without forcing them.\n\n\
                    Summary: heel first, slow exhale, relaxed arms. Repeat the reset \
                    whenever the stride starts to feel rushed or uneven again.";
        assert!(body.chars().count() >= MIN_REPLY_CHARS);
        body.to_string()
    }

    #[test]
    fn test_clean_reply_scores_full() {
        let report = score_exchange("how does the heel reset work", &structured_reply());
        assert_eq!(report.score, 100, "{:?}", report.issues);
        assert!(report.issues.is_empty());
        assert!(!report.needs_review);
    }

    #[test]
    fn test_short_structured_reply_loses_only_length() {
        // 280 characters, one generic phrase, every marker present.
        let mut reply = "Typically the heel lands first, because it sets the rhythm.\n\n\
                         - Exhale slowly.\n\
                         - Roll heel to toe.\n\n\
                         Summary: heel first and a slow exhale"
            .to_string();
        let padding = 280 - reply.chars().count();
        reply.push_str(&".".repeat(padding));
        assert_eq!(reply.chars().count(), 280);
        assert_eq!(generic_phrase_hits(&reply), 1);

        let report = score_exchange("heel reset", &reply);
        assert_eq!(report.score, 70);
        assert!(!report.needs_review);
        assert_eq!(report.issues, vec!["reply too short"]);
    }

    #[test]
    fn test_missing_markers_and_connective() {
        let reply = "a".repeat(MIN_REPLY_CHARS);
        let report = score_exchange("", &reply);
        assert_eq!(report.score, 100 - 15 * 3 - 20);
        assert!(report.needs_review);
        assert_eq!(report.issues.len(), 4);
    }

    #[test]
    fn test_keyword_deduction_starts_past_allowance() {
        let reply = structured_reply();
        let five = "alpha bravo charlie delta echo";
        let six = "alpha bravo charlie delta echo foxtrot";
        assert_eq!(score_exchange(five, &reply).score, 100);
        assert_eq!(score_exchange(six, &reply).score, 100 - 12);
    }

    #[test]
    fn test_keywords_are_distinct_and_longer_than_two() {
        let keywords = utterance_keywords("Is the HEEL heel reset ok? 골반 리셋 방법");
        let expected: BTreeSet<String> = ["heel", "reset", "the"]
            .into_iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(keywords, expected);
        assert!(utterance_keywords("골반 리셋하는 방법").contains("리셋하는"));
    }

    #[test]
    fn test_score_floor_is_zero() {
        let utterance = "alpha bravo charlie delta echo foxtrot golf hotel india juliet \
                         kilo lima mike november oscar papa quebec romeo sierra tango";
        let reply = "in general typically accessibility viability partnership";
        let report = score_exchange(utterance, reply);
        assert_eq!(report.score, 0);
        assert!(report.needs_review);
    }

    #[test]
    fn test_list_item_forms() {
        assert!(has_list_item("intro\n1. first"));
        assert!(has_list_item("intro\n  * first"));
        assert!(has_list_item("• 첫째"));
        assert!(!has_list_item("a - b"));
    }

    #[test]
    fn test_korean_summary_and_connective() {
        assert!(has_summary_line("본문\n요약: 발뒤꿈치 먼저"));
        assert!(has_connective("호흡이 느려지기 때문에 안정된다"));
    }

    proptest! {
        #[test]
        fn prop_generic_threshold_is_monotonic(extra in 0usize..3) {
            let base = structured_reply();
            let with = |n: usize| {
                let phrases = GENERIC_PHRASES[..n].join(", ");
                score_exchange("heel reset", &format!("{base}\n{phrases}")).score
            };

            // Below the threshold hits cost nothing.
            prop_assert_eq!(with(extra), 100);
            prop_assert_eq!(with(2) - with(3), 10);
            prop_assert_eq!(with(3) - with(4), 10);
        }

        #[test]
        fn prop_score_is_bounded_and_consistent(utterance in ".{0,200}", reply in ".{0,600}") {
            let report = score_exchange(&utterance, &reply);
            prop_assert!(report.score <= MAX_SCORE);
            prop_assert_eq!(report.needs_review, report.score < REVIEW_THRESHOLD);
            prop_assert_eq!(report.score == MAX_SCORE, report.issues.is_empty());
        }
    }
}
