//! Synchronous lexicon-based analyzers: a VADER-style compound scorer and
//! an AFINN-style lexicon-sum scorer (§4.3). Both are pure functions of the
//! input text — no host, no async, no cache.

use crate::types::{Polarity, PredictionEntry, RawPrediction};

/// VADER's empirically-derived normalization constant.
const VADER_ALPHA: f32 = 15.0;
/// VADER's negation damping factor applied to a flipped valence.
const NEGATION_DAMPING: f32 = 0.74;
/// VADER's booster-word increment.
const BOOSTER_INCREMENT: f32 = 0.293;

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nobody", "nothing", "neither", "nowhere", "cannot", "can't",
    "won't", "isn't", "wasn't", "shouldn't", "wouldn't", "couldn't", "doesn't", "don't", "didn't",
];

const BOOSTERS: &[(&str, f32)] = &[
    ("very", BOOSTER_INCREMENT),
    ("extremely", BOOSTER_INCREMENT * 1.5),
    ("really", BOOSTER_INCREMENT),
    ("so", BOOSTER_INCREMENT * 0.8),
    ("slightly", -BOOSTER_INCREMENT),
    ("somewhat", -BOOSTER_INCREMENT * 0.8),
    ("barely", -BOOSTER_INCREMENT * 1.2),
];

/// A small representative VADER-style sentiment lexicon. Real deployments
/// load the published ~7500-term lexicon from a data file; this is an
/// embedded subset sufficient for the scorer's contract.
const VADER_LEXICON: &[(&str, f32)] = &[
    ("love", 3.2),
    ("loved", 3.0),
    ("great", 3.1),
    ("good", 1.9),
    ("happy", 2.7),
    ("grateful", 2.8),
    ("excellent", 3.4),
    ("amazing", 3.3),
    ("wonderful", 3.3),
    ("nice", 1.8),
    ("awesome", 3.1),
    ("glad", 2.2),
    ("fantastic", 3.4),
    ("terrible", -3.1),
    ("horrible", -3.2),
    ("awful", -3.0),
    ("bad", -2.1),
    ("hate", -3.1),
    ("sad", -2.0),
    ("angry", -2.6),
    ("worst", -3.3),
    ("disappointing", -2.4),
    ("annoying", -2.0),
    ("broken", -1.8),
    ("meeting", 0.0),
    ("ok", 0.8),
    ("okay", 0.8),
    ("fine", 0.8),
];

/// A small representative AFINN-style integer word-valence lexicon.
const AFINN_LEXICON: &[(&str, i32)] = &[
    ("love", 3),
    ("great", 3),
    ("good", 2),
    ("happy", 3),
    ("excellent", 4),
    ("nice", 2),
    ("awesome", 4),
    ("bad", -2),
    ("terrible", -3),
    ("horrible", -4),
    ("hate", -3),
    ("sad", -2),
    ("angry", -3),
    ("worst", -4),
    ("annoying", -2),
    ("broken", -2),
];

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|tok| {
            tok.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_ascii_lowercase()
        })
        .filter(|tok| !tok.is_empty())
        .collect()
}

fn is_negated(tokens: &[String], idx: usize) -> bool {
    let start = idx.saturating_sub(3);
    tokens[start..idx].iter().any(|t| NEGATIONS.contains(&t.as_str()))
}

fn booster_before(tokens: &[String], idx: usize) -> f32 {
    if idx == 0 {
        return 0.0;
    }
    BOOSTERS
        .iter()
        .find(|(word, _)| tokens[idx - 1] == *word)
        .map(|(_, boost)| *boost)
        .unwrap_or(0.0)
}

/// The VADER-style `{compound, pos, neg, neu}` result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompoundResult {
    pub compound: f32,
    pub pos: f32,
    pub neg: f32,
    pub neu: f32,
}

impl CompoundResult {
    pub fn polarity(&self) -> Polarity {
        if self.compound >= 0.05 {
            Polarity::Positive
        } else if self.compound <= -0.05 {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }

    pub fn to_raw_prediction(self) -> RawPrediction {
        RawPrediction::new(vec![
            PredictionEntry {
                label: "positive".to_string(),
                score: self.pos,
            },
            PredictionEntry {
                label: "negative".to_string(),
                score: self.neg,
            },
            PredictionEntry {
                label: "neutral".to_string(),
                score: self.neu,
            },
        ])
    }
}

/// Compound (VADER-style) scorer. Pure function of `text`.
pub fn compound_score(text: &str) -> CompoundResult {
    let tokens = tokenize(text);
    let mut valences = Vec::with_capacity(tokens.len());

    for (idx, tok) in tokens.iter().enumerate() {
        let Some(&(_, base)) = VADER_LEXICON.iter().find(|(w, _)| w == tok) else {
            continue;
        };
        if base == 0.0 {
            continue;
        }
        let mut valence = base + base.signum() * booster_before(&tokens, idx);
        if is_negated(&tokens, idx) {
            valence *= -NEGATION_DAMPING;
        }
        valences.push(valence);
    }

    let raw_sum: f32 = valences.iter().sum();
    let compound = raw_sum / (raw_sum * raw_sum + VADER_ALPHA).sqrt();

    let pos_sum: f32 = valences.iter().filter(|v| **v > 0.0).sum();
    let neg_sum: f32 = valences.iter().filter(|v| **v < 0.0).map(|v| v.abs()).sum();
    let neu_count = tokens.len() as f32 - valences.len() as f32;
    let total = pos_sum + neg_sum + neu_count.max(0.0);

    let (pos, neg, neu) = if total > 0.0 {
        (pos_sum / total, neg_sum / total, neu_count.max(0.0) / total)
    } else {
        (0.0, 0.0, 1.0)
    };

    CompoundResult {
        compound: compound.clamp(-1.0, 1.0),
        pos,
        neg,
        neu,
    }
}

/// The AFINN-style `{sum, comparative, positiveWords, negativeWords}` result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LexiconSumResult {
    pub sum: i32,
    pub comparative: f32,
    pub positive_words: u32,
    pub negative_words: u32,
}

impl LexiconSumResult {
    pub fn polarity(&self) -> Polarity {
        if self.sum > 0 {
            Polarity::Positive
        } else if self.sum < 0 {
            Polarity::Negative
        } else {
            Polarity::Neutral
        }
    }

    /// Deterministic projection of `{sum, comparative}` onto the shared
    /// `{positive, negative, neutral}` label space: the comparative score is
    /// squashed to `[-1,1]` with `tanh`, then split into a positive and a
    /// negative component that sum to `|tanh(comparative)|`, with the
    /// remainder assigned to neutral. This keeps the three scores summing
    /// to exactly 1 without inventing an unrelated probability model.
    pub fn to_raw_prediction(self) -> RawPrediction {
        let c = self.comparative.tanh();
        let pos = c.max(0.0);
        let neg = (-c).max(0.0);
        let neu = 1.0 - pos - neg;
        RawPrediction::new(vec![
            PredictionEntry {
                label: "positive".to_string(),
                score: pos,
            },
            PredictionEntry {
                label: "negative".to_string(),
                score: neg,
            },
            PredictionEntry {
                label: "neutral".to_string(),
                score: neu,
            },
        ])
    }
}

/// Lexicon-sum (AFINN-style) scorer. Pure function of `text`.
pub fn lexicon_sum_score(text: &str) -> LexiconSumResult {
    let tokens = tokenize(text);
    let mut sum = 0i32;
    let mut positive_words = 0u32;
    let mut negative_words = 0u32;

    for tok in &tokens {
        if let Some(&(_, score)) = AFINN_LEXICON.iter().find(|(w, _)| w == tok) {
            sum += score;
            if score > 0 {
                positive_words += 1;
            } else if score < 0 {
                negative_words += 1;
            }
        }
    }

    let comparative = if tokens.is_empty() {
        0.0
    } else {
        sum as f32 / tokens.len() as f32
    };

    LexiconSumResult {
        sum,
        comparative,
        positive_words,
        negative_words,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_positive_negative_neutral() {
        assert_eq!(compound_score("I love this!").polarity(), Polarity::Positive);
        assert_eq!(compound_score("This is terrible.").polarity(), Polarity::Negative);
        assert_eq!(compound_score("The meeting is at 3 PM.").polarity(), Polarity::Neutral);
    }

    #[test]
    fn compound_negation_flips_sign() {
        let plain = compound_score("This is good.");
        let negated = compound_score("This is not good.");
        assert!(negated.compound < plain.compound);
    }

    #[test]
    fn compound_raw_prediction_sums_to_one() {
        let r = compound_score("I love this amazing and wonderful day");
        let p = r.to_raw_prediction();
        let total: f32 = p.entries().iter().map(|e| e.score).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn lexicon_sum_basic() {
        let r = lexicon_sum_score("This is terrible and bad");
        assert_eq!(r.polarity(), Polarity::Negative);
        assert_eq!(r.negative_words, 2);
        assert_eq!(r.positive_words, 0);
    }

    #[test]
    fn lexicon_sum_raw_prediction_sums_to_one() {
        let r = lexicon_sum_score("great good awesome");
        let p = r.to_raw_prediction();
        let total: f32 = p.entries().iter().map(|e| e.score).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}
