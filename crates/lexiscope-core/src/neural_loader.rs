//! Resolves an `ArtifactRef` + layout profile to concrete artifact URLs,
//! validates their presence, and produces a loaded model handle inside an
//! `InferenceHost` (§4.4).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use ort::session::Session;
use tokenizers::Tokenizer;

use crate::artifact_store::ArtifactStore;
use crate::types::AnalyzerTask;

#[derive(Debug, thiserror::Error)]
pub enum NeuralLoaderError {
    #[error("no layout profile produced existing artifact files for {0}")]
    LayoutUnresolvable(String),
    #[error("runtime rejected both quantized and full-precision weights: {0}")]
    WeightLoadFailed(String),
    #[error(transparent)]
    Artifact(#[from] crate::artifact_store::ArtifactError),
    #[error("failed to initialize tokenizer: {0}")]
    TokenizerInit(String),
    #[error("failed to initialize inference session: {0}")]
    SessionInit(String),
}

pub type Result<T> = std::result::Result<T, NeuralLoaderError>;

/// How to locate weight and tokenizer files for a specific model, relative
/// to its `ArtifactRef` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutProfile {
    /// `<ref>/onnx/model_quantized.onnx`, fallback `<ref>/onnx/model.onnx`.
    StandardOnnxSubfolder,
    /// `<ref>/model_quantized.onnx`, fallback `<ref>/model.onnx`.
    RootOnnx,
    /// A specific filename at the root, e.g.
    /// `<ref>/model_optimized_quantized.onnx`.
    NamedRootOnnx,
}

const CONFIG_FILENAMES: &[&str] = &["config.json", "tokenizer_config.json"];
const TOKENIZER_FILENAME: &str = "tokenizer.json";

impl LayoutProfile {
    fn weight_filenames(self) -> (&'static str, &'static str) {
        match self {
            LayoutProfile::StandardOnnxSubfolder => ("onnx/model_quantized.onnx", "onnx/model.onnx"),
            LayoutProfile::RootOnnx => ("model_quantized.onnx", "model.onnx"),
            LayoutProfile::NamedRootOnnx => ("model_optimized_quantized.onnx", "model.onnx"),
        }
    }

    fn artifact_url(remote_host: &str, artifact_ref: &str, path: &str) -> String {
        format!("https://{remote_host}/{artifact_ref}/resolve/main/{path}")
    }

    pub fn config_urls(self, remote_host: &str, artifact_ref: &str) -> Vec<String> {
        CONFIG_FILENAMES
            .iter()
            .map(|f| Self::artifact_url(remote_host, artifact_ref, f))
            .collect()
    }

    pub fn weight_urls(self, remote_host: &str, artifact_ref: &str) -> Vec<String> {
        let (quantized, full) = self.weight_filenames();
        vec![
            Self::artifact_url(remote_host, artifact_ref, quantized),
            Self::artifact_url(remote_host, artifact_ref, full),
        ]
    }

    pub fn tokenizer_url(self, remote_host: &str, artifact_ref: &str) -> String {
        Self::artifact_url(remote_host, artifact_ref, TOKENIZER_FILENAME)
    }
}

/// A loaded model: an ONNX session and its tokenizer, ready for `infer`.
/// `labels` is the model's `id2label` vocabulary, ordered by class index, if
/// `config.json` carried one — §4.5 derives the display contract from these
/// labels, so a model with no parseable `id2label` falls back to synthetic
/// `LABEL_{i}` names at the `InferenceHost` layer.
pub struct LoadedModel {
    pub session: Session,
    pub tokenizer: Arc<Tokenizer>,
    pub task: AnalyzerTask,
    pub labels: Option<Vec<String>>,
}

/// Validates that at least one config file and one weight file exist for
/// `artifact_ref` under `layout`, fetching and caching them via `store`.
/// Retries once with the full-precision weight file on a quantized-weight
/// load failure (§4.4 "Quantization fallback").
pub async fn load(
    store: &ArtifactStore,
    remote_host: &str,
    artifact_ref: &str,
    task: AnalyzerTask,
    layout: LayoutProfile,
    scratch_dir: &std::path::Path,
) -> Result<LoadedModel> {
    let config_urls = layout.config_urls(remote_host, artifact_ref);
    let mut config_found = false;
    let mut labels: Option<Vec<String>> = None;
    for url in &config_urls {
        if let Ok(artifact) = store.fetch(url).await {
            config_found = true;
            if labels.is_none() {
                labels = parse_id2label(&artifact.bytes);
            }
        }
    }
    if !config_found {
        return Err(NeuralLoaderError::LayoutUnresolvable(artifact_ref.to_string()));
    }

    let weight_urls = layout.weight_urls(remote_host, artifact_ref);
    let quantized_url = &weight_urls[0];
    let full_precision_url = &weight_urls[1];

    let weight_bytes = match store.fetch(quantized_url).await {
        Ok(artifact) => artifact.bytes,
        Err(_) => store
            .fetch(full_precision_url)
            .await
            .map_err(|e| NeuralLoaderError::WeightLoadFailed(e.to_string()))?
            .bytes,
    };

    let tokenizer_url = layout.tokenizer_url(remote_host, artifact_ref);
    let tokenizer_bytes = store.fetch(&tokenizer_url).await?.bytes;

    let weight_path = scratch_dir.join(format!("{}.onnx", content_key(artifact_ref)));
    std::fs::write(&weight_path, &weight_bytes).map_err(|e| NeuralLoaderError::SessionInit(e.to_string()))?;

    let session = Session::builder()
        .map_err(|e| NeuralLoaderError::SessionInit(e.to_string()))?
        .commit_from_file(&weight_path)
        .map_err(|e| NeuralLoaderError::SessionInit(e.to_string()))?;

    let tokenizer = Tokenizer::from_bytes(&tokenizer_bytes)
        .map_err(|e| NeuralLoaderError::TokenizerInit(e.to_string()))?;

    Ok(LoadedModel {
        session,
        tokenizer: Arc::new(tokenizer),
        task,
        labels,
    })
}

fn content_key(artifact_ref: &str) -> String {
    artifact_ref.replace('/', "_")
}

/// Parses a HuggingFace-style `config.json`'s `id2label` map into a vector
/// ordered by class index. Returns `None` if the bytes aren't valid JSON, or
/// if no `id2label` object is present.
fn parse_id2label(bytes: &[u8]) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_slice(bytes).ok()?;
    let map = value.get("id2label")?.as_object()?;

    let mut entries: Vec<(usize, String)> = map
        .iter()
        .filter_map(|(k, v)| Some((k.parse::<usize>().ok()?, v.as_str()?.to_string())))
        .collect();
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|(idx, _)| *idx);

    let max_idx = entries.last().map(|(idx, _)| *idx)?;
    let mut labels = vec![String::new(); max_idx + 1];
    for (idx, label) in entries {
        labels[idx] = label;
    }
    Some(labels)
}

#[allow(dead_code)]
fn scratch_path_placeholder() -> PathBuf {
    std::env::temp_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_profile_url_shapes() {
        let urls = LayoutProfile::StandardOnnxSubfolder.weight_urls("hf.example", "org/model");
        assert_eq!(urls[0], "https://hf.example/org/model/resolve/main/onnx/model_quantized.onnx");
        assert_eq!(urls[1], "https://hf.example/org/model/resolve/main/onnx/model.onnx");

        let urls = LayoutProfile::RootOnnx.weight_urls("hf.example", "org/model");
        assert_eq!(urls[0], "https://hf.example/org/model/resolve/main/model_quantized.onnx");

        let urls = LayoutProfile::NamedRootOnnx.weight_urls("hf.example", "org/model");
        assert_eq!(urls[0], "https://hf.example/org/model/resolve/main/model_optimized_quantized.onnx");
    }

    #[test]
    fn config_urls_cover_both_filenames() {
        let urls = LayoutProfile::RootOnnx.config_urls("hf.example", "org/model");
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("config.json"));
        assert!(urls[1].ends_with("tokenizer_config.json"));
    }

    #[test]
    fn parse_id2label_orders_by_index() {
        let json = br#"{"id2label": {"2": "negative", "0": "positive", "1": "neutral"}}"#;
        let labels = parse_id2label(json).unwrap();
        assert_eq!(labels, vec!["positive", "neutral", "negative"]);
    }

    #[test]
    fn parse_id2label_missing_returns_none() {
        let json = br#"{"hidden_size": 768}"#;
        assert!(parse_id2label(json).is_none());
    }
}
