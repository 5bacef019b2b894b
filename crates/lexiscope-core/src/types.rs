//! Core data model: analyzers, plans, predictions and cell results.
//!
//! These types are deliberately plain data — the behavior that turns a
//! `RawPrediction` into a `CellResult` lives in [`crate::output_classifier`],
//! and the behavior that drives a `Plan` to completion lives in
//! [`crate::pipeline_driver`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque short string identifying an analyzer choice (e.g. `vader`, `goemotions`).
///
/// Globally unique within a run.
pub type AnalyzerId = String;

/// A remote model identifier of the form `owner/name`.
///
/// Treated as opaque by the core except that it is used verbatim as the
/// cache key prefix and it selects a [`crate::neural_loader::LayoutProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    pub fn new(owner_slash_name: impl Into<String>) -> Self {
        Self(owner_slash_name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an analyzer is a synchronous rule-based scorer or a neural model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalyzerKind {
    Rule,
    Neural,
}

/// The task hint an analyzer carries; selects the runtime pipeline factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalyzerTask {
    Sentiment,
    Classification,
}

impl Default for AnalyzerTask {
    /// §4.4: "If unknown, default is classification."
    fn default() -> Self {
        AnalyzerTask::Classification
    }
}

/// Immutable metadata describing one analyzer, supplied by the Registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerDescriptor {
    pub id: AnalyzerId,
    pub display_name: String,
    pub kind: AnalyzerKind,
    pub task: AnalyzerTask,
    pub artifact: Option<ArtifactRef>,
    pub estimated_artifact_bytes: u64,
    pub layout_profile: Option<crate::neural_loader::LayoutProfile>,
    /// Moderation short-code models need their raw labels remapped to human
    /// names *before* family inference; see `LabelRemapper`.
    pub moderation_short_codes: bool,
}

/// An ordered, finite, non-empty-line sequence. Indices are stable cell
/// coordinates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputBatch {
    pub lines: Vec<String>,
}

impl InputBatch {
    pub fn new(lines: Vec<String>) -> Self {
        Self { lines }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Options that shape how a `Plan` is executed, beyond line/analyzer choice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlanOptions {
    /// Keep a neural model's host resident after its column finishes instead
    /// of terminating it immediately (§4.7 step 2b).
    pub keep_artifacts_resident: bool,
    /// Whether downstream export should expand multi-label/multi-class/
    /// moderation cells into one column per label (§6). The core only
    /// carries this flag through; expansion itself is an exporter concern.
    pub classification_expansion: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            keep_artifacts_resident: false,
            classification_expansion: false,
        }
    }
}

/// The input to `PipelineDriver`: lines, ordered analyzers, and options.
#[derive(Debug, Clone)]
pub struct Plan {
    pub batch: InputBatch,
    pub analyzers: Vec<AnalyzerDescriptor>,
    pub options: PlanOptions,
}

/// One `(label, score)` pair within a `RawPrediction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionEntry {
    pub label: String,
    pub score: f32,
}

/// A non-empty sequence of `{label, score}`. Labels are unique within a
/// prediction. For multi-class predictions scores sum to ~1; for
/// multi-label predictions they are independent and do not sum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction(pub Vec<PredictionEntry>);

impl RawPrediction {
    /// Panics if `entries` is empty — the non-empty invariant is upheld
    /// at construction.
    pub fn new(entries: Vec<PredictionEntry>) -> Self {
        assert!(!entries.is_empty(), "RawPrediction must not be empty");
        Self(entries)
    }

    pub fn entries(&self) -> &[PredictionEntry] {
        &self.0
    }

    /// The highest-scoring entry; stable tie-break on the earlier index
    /// (§4.5 "Tie-break").
    pub fn top(&self) -> &PredictionEntry {
        let mut best = &self.0[0];
        for entry in &self.0[1..] {
            if entry.score > best.score {
                best = entry;
            }
        }
        best
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.label.as_str())
    }

    pub fn score_of(&self, label: &str) -> Option<f32> {
        self.0.iter().find(|e| e.label == label).map(|e| e.score)
    }

    /// Count of classes with score strictly greater than `threshold`.
    pub fn count_above(&self, threshold: f32) -> usize {
        self.0.iter().filter(|e| e.score > threshold).count()
    }
}

/// The coarse sentiment outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

/// The semantic class of an analyzer's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Family {
    Sentiment,
    MultiLabel,
    MultiClass,
    Moderation,
}

/// Closed set of error kinds a `Failed` cell can carry (§7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellErrorKind {
    ArtifactNotFound,
    ArtifactFetchFailed,
    CacheUnsupported,
    CachePersistenceFailed,
    ArtifactLayoutUnresolvable,
    WeightLoadFailed,
    HostAlreadyRunning,
    HostTerminated,
    HostUnavailable,
    ModelLoadFailed,
    InferenceError,
    Timeout,
    Cancelled,
}

/// A terminal or pending cell value. Once `Ready` or `Failed`, a cell never
/// changes (§3 invariants).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum CellResult {
    Pending,
    Ready {
        analyzer_id: AnalyzerId,
        family: Family,
        display_label: String,
        display_score: f32,
        polarity: Option<Polarity>,
        raw_distribution: RawPrediction,
        multi_active: bool,
        processing_micros: u64,
    },
    Failed {
        analyzer_id: AnalyzerId,
        error_kind: CellErrorKind,
        message: String,
    },
}

impl CellResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, CellResult::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }
}

/// End-of-plan summary returned alongside the populated matrix (§6).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EndOfPlanSummary {
    pub completed_cells: u64,
    pub failed_cells: u64,
    pub host_terminations: u64,
    pub total_elapsed_micros: u64,
    pub cancelled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn top_is_stable_on_ties() {
        let p = pred(&[("a", 0.5), ("b", 0.5), ("c", 0.2)]);
        assert_eq!(p.top().label, "a");
    }

    #[test]
    fn count_above_threshold() {
        let p = pred(&[("joy", 0.82), ("gratitude", 0.54), ("admiration", 0.11), ("neutral", 0.02)]);
        assert_eq!(p.count_above(0.10), 3);
    }

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn raw_prediction_rejects_empty() {
        RawPrediction::new(vec![]);
    }
}
