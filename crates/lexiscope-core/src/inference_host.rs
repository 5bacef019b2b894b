//! Isolated execution context owning loaded neural model handles (§4.2).
//!
//! Terminating a host releases all memory and native resources it held,
//! with no partial-free semantics — the target ONNX runtime grows its
//! working memory monotonically and does not reliably return it, so
//! wholesale disposal is the only guaranteed reclamation mechanism.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use ort::value::Tensor;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task;

use crate::artifact_store::ArtifactStore;
use crate::neural_loader::{self, LayoutProfile, LoadedModel};
use crate::types::{AnalyzerId, AnalyzerTask, PredictionEntry, RawPrediction};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("host is already running")]
    AlreadyRunning,
    #[error("host has been terminated")]
    Terminated,
    #[error("host is not available")]
    Unavailable,
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("inference timed out")]
    Timeout,
    #[error(transparent)]
    Loader(#[from] neural_loader::NeuralLoaderError),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// `Idle → Starting → Running → (Terminating → Terminated)` (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Terminating = 3,
    Terminated = 4,
}

impl HostState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => HostState::Idle,
            1 => HostState::Starting,
            2 => HostState::Running,
            3 => HostState::Terminating,
            _ => HostState::Terminated,
        }
    }
}

#[derive(Clone)]
struct ModelEntry {
    session: Arc<StdMutex<ort::session::Session>>,
    tokenizer: Arc<tokenizers::Tokenizer>,
    task: AnalyzerTask,
    labels: Option<Arc<Vec<String>>>,
}

/// A single isolated execution context. `infer` calls are serialized
/// host-wide via `infer_lock`; concurrent calls on *distinct* hosts are
/// independent (§5).
pub struct InferenceHost {
    state: AtomicU8,
    models: StdMutex<HashMap<AnalyzerId, ModelEntry>>,
    infer_lock: AsyncMutex<()>,
}

impl Default for InferenceHost {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(HostState::Idle as u8),
            models: StdMutex::new(HashMap::new()),
            infer_lock: AsyncMutex::new(()),
        }
    }
}

impl InferenceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HostState {
        HostState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: HostState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Instantiates a fresh host. Calling `start` on a live host is an
    /// error.
    pub fn start(&self) -> Result<()> {
        match self.state() {
            HostState::Running | HostState::Starting => Err(HostError::AlreadyRunning),
            HostState::Terminated | HostState::Terminating => Err(HostError::Terminated),
            HostState::Idle => {
                self.set_state(HostState::Starting);
                self.set_state(HostState::Running);
                Ok(())
            }
        }
    }

    /// Downloads (via `store`) and instantiates an inference handle. On
    /// failure the host remains live and no handle is registered.
    pub async fn load_model(
        &self,
        store: &ArtifactStore,
        remote_host: &str,
        model_id: &AnalyzerId,
        artifact_ref: &str,
        task: AnalyzerTask,
        layout: LayoutProfile,
        scratch_dir: &std::path::Path,
    ) -> Result<()> {
        if self.state() != HostState::Running {
            return Err(HostError::Unavailable);
        }

        let LoadedModel {
            session,
            tokenizer,
            task,
            labels,
        } = neural_loader::load(store, remote_host, artifact_ref, task, layout, scratch_dir).await?;

        self.models.lock().unwrap().insert(
            model_id.clone(),
            ModelEntry {
                session: Arc::new(StdMutex::new(session)),
                tokenizer,
                task,
                labels: labels.map(Arc::new),
            },
        );
        Ok(())
    }

    /// Runs inference for `text` against the model registered as `model_id`.
    /// Serialized host-wide: concurrent calls queue on `infer_lock`.
    pub async fn infer(&self, model_id: &AnalyzerId, text: &str) -> Result<RawPrediction> {
        if self.state() != HostState::Running {
            return Err(HostError::Terminated);
        }

        let _permit = self.infer_lock.lock().await;

        if self.state() != HostState::Running {
            return Err(HostError::Terminated);
        }

        let entry = self
            .models
            .lock()
            .unwrap()
            .get(model_id)
            .cloned()
            .ok_or_else(|| HostError::Inference(format!("model {model_id} not loaded")))?;
        let text = text.to_string();

        let result = task::spawn_blocking(move || -> std::result::Result<RawPrediction, String> {
            let encoding = entry
                .tokenizer
                .encode(text.as_str(), true)
                .map_err(|e| e.to_string())?;

            let ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
            let mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
            let seq_len = ids.len();

            let input_ids = Tensor::from_array(([1usize, seq_len], ids)).map_err(|e| e.to_string())?;
            let attention_mask =
                Tensor::from_array(([1usize, seq_len], mask)).map_err(|e| e.to_string())?;

            let mut session = entry.session.lock().unwrap();
            let outputs = session
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                ])
                .map_err(|e| e.to_string())?;

            let (shape, logits) = outputs[0].try_extract_tensor::<f32>().map_err(|e| e.to_string())?;

            let num_classes = *shape.last().unwrap_or(&0) as usize;
            let row = &logits[..num_classes.min(logits.len())];

            let scores = match entry.task {
                AnalyzerTask::Sentiment => softmax(row),
                AnalyzerTask::Classification => sigmoid_per_class(row),
            };

            let entries = scores
                .into_iter()
                .enumerate()
                .map(|(i, score)| PredictionEntry {
                    label: entry
                        .labels
                        .as_ref()
                        .and_then(|labels| labels.get(i))
                        .cloned()
                        .unwrap_or_else(|| format!("LABEL_{i}")),
                    score,
                })
                .collect::<Vec<_>>();

            Ok(RawPrediction::new(entries))
        })
        .await
        .map_err(|e| HostError::Inference(e.to_string()))?;

        result.map_err(HostError::Inference)
    }

    /// Best-effort release of one model's resources within the host.
    pub fn dispose_model(&self, model_id: &AnalyzerId) {
        self.models.lock().unwrap().remove(model_id);
    }

    /// Best-effort release of all handles.
    pub fn dispose_all(&self) {
        self.models.lock().unwrap().clear();
    }

    /// Unconditionally tears down the host. Idempotent. After `terminate`,
    /// any pending `infer` fails with `HostTerminated`.
    pub fn terminate(&self) {
        if self.state() == HostState::Terminated {
            return;
        }
        self.set_state(HostState::Terminating);
        self.models.lock().unwrap().clear();
        self.set_state(HostState::Terminated);
    }
}

/// Normalizes a mutually-exclusive head (the `sentiment` task hint): scores
/// sum to ~1, matching the multi-class contract in §6.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|x| x / sum).collect()
}

/// Applies sigmoid independently per class (the `classification` task hint).
/// Most ONNX exports reached via this task — emotion, toxicity, moderation,
/// zero-shot topic heads — are multi-label or treated as such downstream by
/// `OutputClassifier`, so per-class sigmoid is the safe default; a model
/// whose family later resolves to `multiClass` still carries independently
/// scored labels here; §6's sum constraint then applies loosely via family
/// inference rather than at this layer.
fn sigmoid_per_class(logits: &[f32]) -> Vec<f32> {
    logits.iter().map(|&x| 1.0 / (1.0 + (-x).exp())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_twice_is_already_running() {
        let host = InferenceHost::new();
        host.start().unwrap();
        assert!(matches!(host.start(), Err(HostError::AlreadyRunning)));
    }

    #[test]
    fn terminate_is_idempotent() {
        let host = InferenceHost::new();
        host.start().unwrap();
        host.terminate();
        host.terminate();
        assert_eq!(host.state(), HostState::Terminated);
    }

    #[test]
    fn start_after_terminate_is_rejected() {
        let host = InferenceHost::new();
        host.start().unwrap();
        host.terminate();
        assert!(matches!(host.start(), Err(HostError::Terminated)));
    }

    #[test]
    fn dispose_model_removes_handle_only() {
        let host = InferenceHost::new();
        host.start().unwrap();
        host.dispose_model(&"missing".to_string());
        assert_eq!(host.state(), HostState::Running);
    }
}
