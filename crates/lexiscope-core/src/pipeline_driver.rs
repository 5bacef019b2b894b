//! Orchestrates column-major streaming execution over `(lines ×
//! analyzers)`, managing host lifecycle and memory policy (§4.7).

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::artifact_store::ArtifactStore;
use crate::cancellation::CancellationToken;
use crate::chunker::{self, AggregationMode, ChunkerConfig};
use crate::inference_host::{HostError, InferenceHost};
use crate::output_classifier;
use crate::registry::Registry;
use crate::result_matrix::{Listener, ResultMatrix};
use crate::rule_scorer;
use crate::types::{
    AnalyzerDescriptor, AnalyzerKind, CellErrorKind, CellResult, EndOfPlanSummary, Plan, PredictionEntry,
    RawPrediction,
};

/// Conditions that prevent a plan from starting at all. Per-cell failures
/// never surface here — they become `CellResult::Failed` (§7).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("plan has no analyzers")]
    EmptyAnalyzerList,
    #[error("plan has no input lines")]
    EmptyBatch,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub remote_host: String,
    pub aggregation: AggregationMode,
    pub chunker: ChunkerConfig,
    /// Soft memory threshold (§5): before starting a second consecutive
    /// neural analyzer without an intervening host termination, the driver
    /// queries process memory (where available) and forces a termination
    /// if this threshold is exceeded. `None` disables the check.
    pub soft_memory_threshold_bytes: Option<u64>,
    /// Optional wall-clock budget per `infer` call.
    pub infer_timeout: Option<Duration>,
    pub scratch_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            remote_host: "huggingface.co".to_string(),
            aggregation: AggregationMode::default(),
            chunker: ChunkerConfig::default(),
            soft_memory_threshold_bytes: Some(1_500_000_000),
            infer_timeout: Some(Duration::from_secs(30)),
            scratch_dir: std::env::temp_dir().join("lexiscope-core"),
        }
    }
}

pub struct PipelineDriver {
    config: PipelineConfig,
    store: ArtifactStore,
    registry: Registry,
}

impl PipelineDriver {
    pub fn new(config: PipelineConfig, store: ArtifactStore, registry: Registry) -> Self {
        Self {
            config,
            store,
            registry,
        }
    }

    /// Executes `plan`, streaming terminal writes to `matrix`'s subscribers
    /// as they occur, honoring `cancellation` between cells and analyzers.
    #[instrument(skip(self, plan, cancellation))]
    pub async fn run(&self, plan: Plan, cancellation: CancellationToken) -> Result<(ResultMatrix, EndOfPlanSummary)> {
        if plan.analyzers.is_empty() {
            return Err(PipelineError::EmptyAnalyzerList);
        }
        if plan.batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        std::fs::create_dir_all(&self.config.scratch_dir).ok();

        let analyzer_ids: Vec<String> = plan.analyzers.iter().map(|a| a.id.clone()).collect();
        let matrix = ResultMatrix::new(plan.batch.len(), analyzer_ids);

        let started_at = Instant::now();
        let mut summary = EndOfPlanSummary::default();
        let mut live_host: Option<InferenceHost> = None;
        let mut consecutive_neural_without_termination = 0u32;

        for (analyzer_index, descriptor) in plan.analyzers.iter().enumerate() {
            if cancellation.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match descriptor.kind {
                AnalyzerKind::Rule => {
                    self.run_rule_column(&matrix, analyzer_index, descriptor, &plan, &cancellation, &mut summary);
                }
                AnalyzerKind::Neural => {
                    if consecutive_neural_without_termination > 0 {
                        if let Some(threshold) = self.config.soft_memory_threshold_bytes {
                            if let Some(rss) = current_process_rss_bytes() {
                                if rss > threshold {
                                    if let Some(host) = live_host.take() {
                                        host.terminate();
                                        summary.host_terminations += 1;
                                    }
                                    consecutive_neural_without_termination = 0;
                                }
                            }
                        }
                    }

                    if live_host.is_none() {
                        let host = InferenceHost::new();
                        host.start().ok();
                        live_host = Some(host);
                    }

                    let host = live_host.as_ref().unwrap();
                    let column_ok = self
                        .run_neural_column(host, &matrix, analyzer_index, descriptor, &plan, &cancellation, &mut summary)
                        .await;

                    if !column_ok {
                        if let Some(host) = live_host.take() {
                            host.terminate();
                            summary.host_terminations += 1;
                        }
                        consecutive_neural_without_termination = 0;
                        continue;
                    }

                    if plan.options.keep_artifacts_resident {
                        host.dispose_model(&descriptor.id);
                        consecutive_neural_without_termination += 1;
                    } else if let Some(host) = live_host.take() {
                        host.terminate();
                        summary.host_terminations += 1;
                        consecutive_neural_without_termination = 0;
                    }
                }
            }

            if cancellation.is_cancelled() {
                summary.cancelled = true;
                break;
            }
        }

        if let Some(host) = live_host.take() {
            host.terminate();
            summary.host_terminations += 1;
        }

        summary.total_elapsed_micros = started_at.elapsed().as_micros() as u64;
        Ok((matrix, summary))
    }

    fn run_rule_column(
        &self,
        matrix: &ResultMatrix,
        analyzer_index: usize,
        descriptor: &AnalyzerDescriptor,
        plan: &Plan,
        cancellation: &CancellationToken,
        summary: &mut EndOfPlanSummary,
    ) {
        for (line_index, line) in plan.batch.lines.iter().enumerate() {
            if cancellation.is_cancelled() {
                return;
            }
            let started = Instant::now();
            let (raw, native_scalar) = score_rule_line(&descriptor.id, line);
            let derived = output_classifier::classify(&raw);
            matrix.set(
                line_index,
                analyzer_index,
                CellResult::Ready {
                    analyzer_id: descriptor.id.clone(),
                    family: derived.family,
                    display_label: derived.display_label,
                    display_score: native_scalar,
                    polarity: derived.polarity,
                    raw_distribution: raw,
                    multi_active: derived.multi_active,
                    processing_micros: started.elapsed().as_micros() as u64,
                },
            );
            summary.completed_cells += 1;
        }
    }

    /// Returns `false` if the column failed at load time (every cell in the
    /// column was written `Failed{ModelLoadFailed}` and the caller should
    /// terminate the host and move on).
    #[instrument(skip(self, host, matrix, plan, cancellation, summary), fields(analyzer = %descriptor.id))]
    async fn run_neural_column(
        &self,
        host: &InferenceHost,
        matrix: &ResultMatrix,
        analyzer_index: usize,
        descriptor: &AnalyzerDescriptor,
        plan: &Plan,
        cancellation: &CancellationToken,
        summary: &mut EndOfPlanSummary,
    ) -> bool {
        let (Some(artifact), Some(layout)) = (&descriptor.artifact, descriptor.layout_profile) else {
            self.fail_column(matrix, analyzer_index, descriptor, plan, CellErrorKind::ArtifactLayoutUnresolvable, "missing artifact or layout profile", summary);
            return false;
        };

        let load_result = host
            .load_model(
                &self.store,
                &self.config.remote_host,
                &descriptor.id,
                artifact.as_str(),
                descriptor.task,
                layout,
                &self.config.scratch_dir,
            )
            .await;

        if let Err(e) = load_result {
            warn!(error = %e, "load_model failed, failing entire column");
            self.fail_column(matrix, analyzer_index, descriptor, plan, CellErrorKind::ModelLoadFailed, &e.to_string(), summary);
            return false;
        }

        info!("model loaded, beginning column");

        for (line_index, line) in plan.batch.lines.iter().enumerate() {
            if cancellation.is_cancelled() {
                return true;
            }

            let started = Instant::now();
            match self.infer_line(host, descriptor, line).await {
                Ok(raw) => {
                    // Family inference (§4.5) runs on the model's raw labels, short
                    // codes included — `classify` itself applies `moderationMap` to
                    // the winning label only for `displayLabel`, so remapping ahead
                    // of time here would hide the short-code pattern it matches on.
                    let derived = output_classifier::classify(&raw);
                    matrix.set(
                        line_index,
                        analyzer_index,
                        CellResult::Ready {
                            analyzer_id: descriptor.id.clone(),
                            family: derived.family,
                            display_label: derived.display_label,
                            display_score: derived.display_score,
                            polarity: derived.polarity,
                            raw_distribution: raw,
                            multi_active: derived.multi_active,
                            processing_micros: started.elapsed().as_micros() as u64,
                        },
                    );
                    summary.completed_cells += 1;
                }
                Err(HostError::Timeout) => {
                    debug!(line_index, "infer timed out, terminating host and failing remainder");
                    matrix.set(
                        line_index,
                        analyzer_index,
                        CellResult::Failed {
                            analyzer_id: descriptor.id.clone(),
                            error_kind: CellErrorKind::Timeout,
                            message: "inference timed out".to_string(),
                        },
                    );
                    summary.failed_cells += 1;
                    self.fail_remaining(matrix, analyzer_index, descriptor, plan, line_index + 1, CellErrorKind::HostUnavailable, summary);
                    return false;
                }
                Err(e) => {
                    matrix.set(
                        line_index,
                        analyzer_index,
                        CellResult::Failed {
                            analyzer_id: descriptor.id.clone(),
                            error_kind: CellErrorKind::InferenceError,
                            message: e.to_string(),
                        },
                    );
                    summary.failed_cells += 1;
                }
            }
        }

        true
    }

    async fn infer_line(
        &self,
        host: &InferenceHost,
        descriptor: &AnalyzerDescriptor,
        line: &str,
    ) -> std::result::Result<RawPrediction, HostError> {
        let chunks = chunker::split(line, &self.config.chunker);

        if chunks.len() == 1 {
            return self.infer_chunk(host, descriptor, &chunks[0]).await;
        }

        let mut per_chunk = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let prediction = self.infer_chunk(host, descriptor, chunk).await?;
            per_chunk.push(
                prediction
                    .entries()
                    .iter()
                    .map(|e| (e.label.clone(), e.score))
                    .collect::<Vec<_>>(),
            );
        }

        let aggregated = chunker::aggregate(&per_chunk, self.config.aggregation);
        let entries = aggregated
            .into_iter()
            .map(|(label, score)| PredictionEntry { label, score })
            .collect();
        Ok(RawPrediction::new(entries))
    }

    async fn infer_chunk(
        &self,
        host: &InferenceHost,
        descriptor: &AnalyzerDescriptor,
        chunk: &str,
    ) -> std::result::Result<RawPrediction, HostError> {
        match self.config.infer_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, host.infer(&descriptor.id, chunk)).await {
                Ok(result) => result,
                Err(_) => Err(HostError::Timeout),
            },
            None => host.infer(&descriptor.id, chunk).await,
        }
    }

    fn fail_column(
        &self,
        matrix: &ResultMatrix,
        analyzer_index: usize,
        descriptor: &AnalyzerDescriptor,
        plan: &Plan,
        kind: CellErrorKind,
        message: &str,
        summary: &mut EndOfPlanSummary,
    ) {
        self.fail_remaining(matrix, analyzer_index, descriptor, plan, 0, kind, summary);
        let _ = message;
    }

    fn fail_remaining(
        &self,
        matrix: &ResultMatrix,
        analyzer_index: usize,
        descriptor: &AnalyzerDescriptor,
        plan: &Plan,
        from_line: usize,
        kind: CellErrorKind,
        summary: &mut EndOfPlanSummary,
    ) {
        for line_index in from_line..plan.batch.len() {
            matrix.set(
                line_index,
                analyzer_index,
                CellResult::Failed {
                    analyzer_id: descriptor.id.clone(),
                    error_kind: kind,
                    message: format!("column failed: {kind:?}"),
                },
            );
            summary.failed_cells += 1;
        }
    }
}

/// Returns the synthesized `{positive, negative, neutral}` raw distribution
/// alongside the scorer's native scalar (`comparative` for AFINN, `compound`
/// for VADER) — §4.3's `displayScore` for rule analyzers is that native
/// scalar, not the top of the synthesized triple.
fn score_rule_line(analyzer_id: &str, line: &str) -> (RawPrediction, f32) {
    if analyzer_id == "afinn" {
        let result = rule_scorer::lexicon_sum_score(line);
        (result.to_raw_prediction(), result.comparative)
    } else {
        let result = rule_scorer::compound_score(line);
        (result.to_raw_prediction(), result.compound)
    }
}

/// Best-effort RSS read from `/proc/self/status` (Linux only). Returns
/// `None` where unavailable, matching §5's "where available" wording.
fn current_process_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
                return Some(kb * 1024);
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Allows callers that already hold a `ResultMatrix` to subscribe before
/// `run` is called.
pub fn subscribe(matrix: &ResultMatrix, listener: impl Listener + 'static) {
    matrix.subscribe(listener);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalyzerKind, AnalyzerTask, InputBatch, PlanOptions};

    fn rule_descriptor(id: &str) -> AnalyzerDescriptor {
        AnalyzerDescriptor {
            id: id.to_string(),
            display_name: id.to_string(),
            kind: AnalyzerKind::Rule,
            task: AnalyzerTask::Sentiment,
            artifact: None,
            estimated_artifact_bytes: 0,
            layout_profile: None,
            moderation_short_codes: false,
        }
    }

    #[tokio::test]
    async fn mixed_rule_only_plan_all_ready() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let driver = PipelineDriver::new(PipelineConfig::default(), store, Registry::builtin());

        let plan = Plan {
            batch: InputBatch::new(vec![
                "I love this!".to_string(),
                "This is terrible.".to_string(),
                "The meeting is at 3 PM.".to_string(),
            ]),
            analyzers: vec![rule_descriptor("vader")],
            options: PlanOptions::default(),
        };

        let (matrix, summary) = driver.run(plan, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.completed_cells, 3);
        assert_eq!(summary.failed_cells, 0);
        for line_index in 0..3 {
            assert!(matrix.get(line_index, 0).is_terminal());
        }

        match matrix.get(0, 0) {
            CellResult::Ready { display_score, .. } => {
                assert!((display_score - rule_scorer::compound_score("I love this!").compound).abs() < 1e-6);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_analyzer_list_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let driver = PipelineDriver::new(PipelineConfig::default(), store, Registry::builtin());
        let plan = Plan {
            batch: InputBatch::new(vec!["hi".to_string()]),
            analyzers: vec![],
            options: PlanOptions::default(),
        };
        assert!(matches!(
            driver.run(plan, CancellationToken::new()).await,
            Err(PipelineError::EmptyAnalyzerList)
        ));
    }

    #[tokio::test]
    async fn cancellation_before_start_yields_cancelled_summary() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::open(dir.path()).unwrap();
        let driver = PipelineDriver::new(PipelineConfig::default(), store, Registry::builtin());
        let plan = Plan {
            batch: InputBatch::new(vec!["hi".to_string()]),
            analyzers: vec![rule_descriptor("vader")],
            options: PlanOptions::default(),
        };
        let token = CancellationToken::new();
        token.cancel();
        let (_matrix, summary) = driver.run(plan, token).await.unwrap();
        assert!(summary.cancelled);
    }
}
