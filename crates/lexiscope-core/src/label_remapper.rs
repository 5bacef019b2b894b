//! Bijective rename tables for moderation short-codes and an emotion-valence
//! lookup used by presentation layers.

use std::collections::HashMap;
use std::sync::OnceLock;

/// `{S→Sexual, H→Hate, V→Violence, HR→Harassment, SH→Self-harm,
/// S3→Sexual/minors, H2→Hate/threatening, V2→Violence/graphic, OK→Safe}`.
const MODERATION_PAIRS: &[(&str, &str)] = &[
    ("S", "Sexual"),
    ("H", "Hate"),
    ("V", "Violence"),
    ("HR", "Harassment"),
    ("SH", "Self-harm"),
    ("S3", "Sexual/minors"),
    ("H2", "Hate/threatening"),
    ("V2", "Violence/graphic"),
    ("OK", "Safe"),
];

/// Curated per §9's open question: no canonical source is mandated, so this
/// list follows the common GoEmotions-style grouping (28 emotions plus
/// neutral) partitioned by valence.
const POSITIVE_EMOTIONS: &[&str] = &[
    "admiration",
    "amusement",
    "approval",
    "caring",
    "desire",
    "excitement",
    "gratitude",
    "joy",
    "love",
    "optimism",
    "pride",
    "relief",
];
const NEGATIVE_EMOTIONS: &[&str] = &[
    "anger",
    "annoyance",
    "disappointment",
    "disapproval",
    "disgust",
    "embarrassment",
    "fear",
    "grief",
    "nervousness",
    "remorse",
    "sadness",
];
const NEUTRAL_EMOTIONS: &[&str] = &["confusion", "curiosity", "realization", "surprise", "neutral"];

/// Coarse valence bucket for an emotion label, used only by presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

fn moderation_table() -> &'static HashMap<&'static str, &'static str> {
    static TABLE: OnceLock<HashMap<&'static str, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| MODERATION_PAIRS.iter().copied().collect())
}

/// Human label for a moderation short code, or the code itself if unknown
/// (defensive: an unrecognized code still needs a display label).
pub fn moderation_map(code: &str) -> String {
    moderation_table()
        .get(code)
        .map(|s| s.to_string())
        .unwrap_or_else(|| code.to_string())
}

/// The set of human labels this mapper can produce, used by
/// `OutputClassifier` tests to assert `displayLabel ∈ range(moderationMap)`.
pub fn moderation_range() -> impl Iterator<Item = &'static str> {
    MODERATION_PAIRS.iter().map(|(_, human)| *human)
}

/// Valence bucket for an emotion label (case-insensitive); `None` if the
/// label is not in the curated vocabulary.
pub fn emotion_valence(label: &str) -> Option<Valence> {
    let lower = label.to_ascii_lowercase();
    if POSITIVE_EMOTIONS.contains(&lower.as_str()) {
        Some(Valence::Positive)
    } else if NEGATIVE_EMOTIONS.contains(&lower.as_str()) {
        Some(Valence::Negative)
    } else if NEUTRAL_EMOTIONS.contains(&lower.as_str()) {
        Some(Valence::Neutral)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderation_map_known_codes() {
        assert_eq!(moderation_map("OK"), "Safe");
        assert_eq!(moderation_map("H2"), "Hate/threatening");
    }

    #[test]
    fn moderation_map_unknown_passthrough() {
        assert_eq!(moderation_map("ZZ"), "ZZ");
    }

    #[test]
    fn emotion_valence_buckets() {
        assert_eq!(emotion_valence("Joy"), Some(Valence::Positive));
        assert_eq!(emotion_valence("anger"), Some(Valence::Negative));
        assert_eq!(emotion_valence("surprise"), Some(Valence::Neutral));
        assert_eq!(emotion_valence("unknown_tag"), None);
    }
}
