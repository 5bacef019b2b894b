//! Infers a semantic [`Family`] from a raw label set and derives the
//! uniform display contract (§4.5).

use crate::label_remapper;
use crate::types::{Family, Polarity, RawPrediction};

const EMOTION_VOCAB: &[&str] = &[
    "joy",
    "anger",
    "fear",
    "sadness",
    "love",
    "surprise",
    "admiration",
    "approval",
    "annoyance",
    "gratitude",
    "desire",
    "excitement",
    "optimism",
    "pride",
    "relief",
    "amusement",
    "caring",
    "confusion",
    "curiosity",
    "disappointment",
    "disapproval",
    "disgust",
    "embarrassment",
    "grief",
    "nervousness",
    "realization",
    "remorse",
];

const TOXICITY_VOCAB: &[&str] = &[
    "toxic",
    "severe_toxic",
    "obscene",
    "threat",
    "insult",
    "identity_hate",
    "identity_attack",
];

const MODERATION_SHORT_CODES: &[&str] = &["S", "H", "V", "HR", "SH", "S3", "H2", "V2", "OK"];

const MULTI_ACTIVE_THRESHOLD: f32 = 0.10;

/// The fully-derived presentation of one `Ready` cell, prior to being
/// folded into a [`crate::types::CellResult`].
#[derive(Debug, Clone)]
pub struct Derived {
    pub family: Family,
    pub display_label: String,
    pub display_score: f32,
    pub polarity: Option<Polarity>,
    pub multi_active: bool,
}

/// Evaluated in order, first match wins (§4.5).
pub fn infer_family(prediction: &RawPrediction) -> Family {
    let labels: Vec<String> = prediction.labels().map(|l| l.to_ascii_lowercase()).collect();

    if labels.len() <= 3
        && labels
            .iter()
            .any(|l| l.contains("pos") || l.contains("neg") || l == "neutral")
    {
        return Family::Sentiment;
    }

    if labels.iter().any(|l| EMOTION_VOCAB.contains(&l.as_str())) {
        return Family::MultiLabel;
    }

    if labels
        .iter()
        .any(|l| TOXICITY_VOCAB.iter().any(|tox| l.contains(tox)))
    {
        return Family::MultiLabel;
    }

    let original_labels: Vec<&str> = prediction.labels().collect();
    if !original_labels.is_empty()
        && original_labels
            .iter()
            .all(|l| MODERATION_SHORT_CODES.contains(l))
    {
        return Family::Moderation;
    }

    Family::MultiClass
}

fn polarity_from_label(label: &str) -> Polarity {
    let lower = label.to_ascii_lowercase();
    if lower.contains("pos") {
        Polarity::Positive
    } else if lower.contains("neg") {
        Polarity::Negative
    } else {
        Polarity::Neutral
    }
}

/// Derive the display contract for a prediction whose family has already
/// been determined (or re-inferred here; `infer_family` is pure and cheap).
pub fn classify(prediction: &RawPrediction) -> Derived {
    let family = infer_family(prediction);
    let top = prediction.top();

    match family {
        Family::Sentiment => Derived {
            family,
            display_label: polarity_label(top.label.as_str()),
            display_score: top.score,
            polarity: Some(polarity_from_label(&top.label)),
            multi_active: false,
        },
        Family::MultiLabel => {
            let multi_active = prediction.count_above(MULTI_ACTIVE_THRESHOLD) >= 2;
            let mut display_label = top.label.clone();
            if multi_active {
                display_label.push('+');
            }
            Derived {
                family,
                display_label,
                display_score: top.score,
                polarity: None,
                multi_active,
            }
        }
        Family::Moderation => {
            let display_label = label_remapper::moderation_map(&top.label);
            let polarity = Some(if top.label == "OK" {
                Polarity::Positive
            } else {
                Polarity::Negative
            });
            Derived {
                family,
                display_label,
                display_score: top.score,
                polarity,
                multi_active: false,
            }
        }
        Family::MultiClass => Derived {
            family,
            display_label: top.label.clone(),
            display_score: top.score,
            polarity: None,
            multi_active: false,
        },
    }
}

/// `sentiment` displayLabel is the polarity name itself, derived from the
/// winning label's substring match rather than echoed verbatim.
fn polarity_label(top_label: &str) -> String {
    match polarity_from_label(top_label) {
        Polarity::Positive => "positive".to_string(),
        Polarity::Negative => "negative".to_string(),
        Polarity::Neutral => "neutral".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PredictionEntry;

    fn pred(pairs: &[(&str, f32)]) -> RawPrediction {
        RawPrediction::new(
            pairs
                .iter()
                .map(|(l, s)| PredictionEntry {
                    label: l.to_string(),
                    score: *s,
                })
                .collect(),
        )
    }

    #[test]
    fn family_inference_table() {
        assert_eq!(infer_family(&pred(&[("POSITIVE", 0.9), ("NEGATIVE", 0.1)])), Family::Sentiment);
        assert_eq!(
            infer_family(&pred(&[("positive", 0.3), ("neutral", 0.5), ("negative", 0.2)])),
            Family::Sentiment
        );
        assert_eq!(
            infer_family(&pred(&[("joy", 0.8), ("anger", 0.1), ("admiration", 0.05), ("approval", 0.05)])),
            Family::MultiLabel
        );
        assert_eq!(
            infer_family(&pred(&[
                ("toxic", 0.9),
                ("severe_toxic", 0.1),
                ("obscene", 0.2),
                ("threat", 0.01),
                ("insult", 0.3),
                ("identity_hate", 0.02)
            ])),
            Family::MultiLabel
        );
        assert_eq!(
            infer_family(&pred(&[
                ("S", 0.1),
                ("H", 0.1),
                ("V", 0.1),
                ("HR", 0.1),
                ("SH", 0.1),
                ("S3", 0.1),
                ("H2", 0.1),
                ("V2", 0.1),
                ("OK", 0.2)
            ])),
            Family::Moderation
        );
        assert_eq!(
            infer_family(&pred(&[("en", 0.5), ("es", 0.1), ("fr", 0.1), ("de", 0.1), ("zh", 0.1), ("ja", 0.1)])),
            Family::MultiClass
        );
        assert_eq!(
            infer_family(&pred(&[
                ("politics", 0.4),
                ("technology", 0.3),
                ("sports", 0.2),
                ("entertainment", 0.1)
            ])),
            Family::MultiClass
        );
    }

    #[test]
    fn multi_label_active_suffix() {
        let p = pred(&[("joy", 0.82), ("gratitude", 0.54), ("admiration", 0.11), ("neutral", 0.02)]);
        let d = classify(&p);
        assert_eq!(d.family, Family::MultiLabel);
        assert!(d.multi_active);
        assert_eq!(d.display_label, "joy+");
        assert_eq!(d.display_score, 0.82);
    }

    #[test]
    fn moderation_safe_case() {
        let p = pred(&[("OK", 0.95), ("H", 0.02), ("V", 0.01)]);
        let d = classify(&p);
        assert_eq!(d.family, Family::Moderation);
        assert_eq!(d.display_label, "Safe");
        assert_eq!(d.polarity, Some(Polarity::Positive));
        assert_eq!(d.display_score, 0.95);
    }

    #[test]
    fn tie_break_is_stable_earlier_index() {
        let p = pred(&[("politics", 0.5), ("sports", 0.5)]);
        let d = classify(&p);
        assert_eq!(d.display_label, "politics");
    }
}
