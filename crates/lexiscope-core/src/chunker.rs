//! Splits long inputs into overlapping chunks and aggregates per-chunk
//! class scores back into one distribution (§4.6).

use std::collections::BTreeMap;

/// Default max chunk length in characters (≈ 480 tokens).
pub const DEFAULT_MAX_CHARS: usize = 1440;
/// Default overlap ratio between consecutive chunks.
pub const DEFAULT_OVERLAP_RATIO: f32 = 0.5;
/// Hard cap on chunk count to prevent pathological inputs.
pub const DEFAULT_MAX_CHUNKS: usize = 100;

const SENTENCE_BOUNDARIES: &[char] = &['.', '?', '!', '\n'];
/// Clamp bound for logit-mean aggregation to avoid `logit(0)`/`logit(1)`.
const LOGIT_EPSILON: f32 = 1e-6;

/// How per-chunk class scores are combined into one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    #[default]
    LogitMean,
    Max,
    Mean,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub max_chars: usize,
    pub overlap_ratio: f32,
    pub max_chunks: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

/// Splits `text` into overlapping chunks per `config`. Operates on
/// character (`char`) boundaries, not bytes, so multi-byte UTF-8 text is
/// never split mid-codepoint.
pub fn split(text: &str, config: &ChunkerConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.max_chars {
        return vec![text.to_string()];
    }

    let stride = ((config.max_chars as f32) * (1.0 - config.overlap_ratio)).floor() as usize;
    let stride = stride.max(1);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() && chunks.len() < config.max_chunks {
        let mut end = (start + config.max_chars).min(chars.len());
        let is_last = end >= chars.len();

        if !is_last {
            let half = start + (end - start) / 2;
            if let Some(boundary) = find_sentence_boundary(&chars, half, end) {
                end = boundary;
            }
        }

        chunks.push(chars[start..end].iter().collect());

        if end >= chars.len() {
            break;
        }
        start += stride;
    }

    chunks
}

fn find_sentence_boundary(chars: &[char], from: usize, to: usize) -> Option<usize> {
    (from..to).rev().find(|&i| SENTENCE_BOUNDARIES.contains(&chars[i])).map(|i| i + 1)
}

fn logit(p: f32) -> f32 {
    let clamped = p.clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
    (clamped / (1.0 - clamped)).ln()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Aggregate per-chunk `(label, score)` lists into one list, preserving the
/// label set from the first chunk. Labels absent from a later chunk
/// contribute score 0 to that chunk.
pub fn aggregate(per_chunk: &[Vec<(String, f32)>], mode: AggregationMode) -> Vec<(String, f32)> {
    let Some(first) = per_chunk.first() else {
        return Vec::new();
    };
    let label_order: Vec<String> = first.iter().map(|(l, _)| l.clone()).collect();

    let mut per_label_scores: BTreeMap<&str, Vec<f32>> = BTreeMap::new();
    for label in &label_order {
        per_label_scores.insert(label.as_str(), Vec::with_capacity(per_chunk.len()));
    }

    for chunk in per_chunk {
        let lookup: BTreeMap<&str, f32> = chunk.iter().map(|(l, s)| (l.as_str(), *s)).collect();
        for label in &label_order {
            let score = lookup.get(label.as_str()).copied().unwrap_or(0.0);
            per_label_scores.get_mut(label.as_str()).unwrap().push(score);
        }
    }

    label_order
        .into_iter()
        .map(|label| {
            let scores = &per_label_scores[label.as_str()];
            let aggregated = match mode {
                AggregationMode::Max => scores.iter().cloned().fold(f32::MIN, f32::max),
                AggregationMode::Mean => scores.iter().sum::<f32>() / scores.len() as f32,
                AggregationMode::LogitMean => {
                    let mean_logit = scores.iter().map(|s| logit(*s)).sum::<f32>() / scores.len() as f32;
                    sigmoid(mean_logit)
                }
            };
            (label, aggregated)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = split("hello world", &ChunkerConfig::default());
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn long_text_produces_overlapping_chunks() {
        let text = "a".repeat(6000);
        let chunks = split(&text, &ChunkerConfig::default());
        assert!(chunks.len() > 1);
        assert!(chunks.len() <= DEFAULT_MAX_CHUNKS);
    }

    #[test]
    fn hard_cap_is_respected() {
        let text = "x".repeat(1_000_000);
        let config = ChunkerConfig {
            max_chars: 10,
            overlap_ratio: 0.5,
            max_chunks: 5,
        };
        let chunks = split(&text, &config);
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn logit_mean_matches_expected_scenario() {
        let per_chunk_scores = [0.6_f32, 0.7, 0.55, 0.8, 0.62, 0.58, 0.71, 0.69];
        let per_chunk: Vec<Vec<(String, f32)>> = per_chunk_scores
            .iter()
            .map(|s| vec![("X".to_string(), *s)])
            .collect();
        let result = aggregate(&per_chunk, AggregationMode::LogitMean);
        let (_, score) = &result[0];
        assert!((*score - 0.655).abs() < 0.01);
    }

    #[test]
    fn max_and_mean_modes() {
        let per_chunk = vec![
            vec![("a".to_string(), 0.2)],
            vec![("a".to_string(), 0.9)],
            vec![("a".to_string(), 0.4)],
        ];
        let max_result = aggregate(&per_chunk, AggregationMode::Max);
        assert!((max_result[0].1 - 0.9).abs() < 1e-6);

        let mean_result = aggregate(&per_chunk, AggregationMode::Mean);
        assert!((mean_result[0].1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn missing_label_in_later_chunk_contributes_zero() {
        let per_chunk = vec![
            vec![("a".to_string(), 0.8), ("b".to_string(), 0.2)],
            vec![("a".to_string(), 0.6)],
        ];
        let result = aggregate(&per_chunk, AggregationMode::Mean);
        let b_score = result.iter().find(|(l, _)| l == "b").unwrap().1;
        assert!((b_score - 0.1).abs() < 1e-6);
    }
}
