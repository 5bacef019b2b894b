//! Static, compile-time-known table of [`AnalyzerDescriptor`]s (§4.10).
//! Adding a new analyzer is a pure data change here, plus a new layout
//! profile entry in `neural_loader` if needed.

use crate::neural_loader::LayoutProfile;
use crate::types::{AnalyzerDescriptor, AnalyzerKind, AnalyzerTask, ArtifactRef};

/// Immutable, shareable. Built once and handed out as plain owned data.
pub struct Registry {
    descriptors: Vec<AnalyzerDescriptor>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self {
            descriptors: builtin_descriptors(),
        }
    }

    pub fn list(&self) -> &[AnalyzerDescriptor] {
        &self.descriptors
    }

    pub fn get(&self, id: &str) -> Option<&AnalyzerDescriptor> {
        self.descriptors.iter().find(|d| d.id == id)
    }

    pub fn estimate_bytes(&self, id: &str) -> Option<u64> {
        self.get(id).map(|d| d.estimated_artifact_bytes)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn rule(id: &str, display_name: &str) -> AnalyzerDescriptor {
    AnalyzerDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        kind: AnalyzerKind::Rule,
        task: AnalyzerTask::Sentiment,
        artifact: None,
        estimated_artifact_bytes: 0,
        layout_profile: None,
        moderation_short_codes: false,
    }
}

fn neural(
    id: &str,
    display_name: &str,
    task: AnalyzerTask,
    artifact: &str,
    estimated_artifact_bytes: u64,
    layout_profile: LayoutProfile,
    moderation_short_codes: bool,
) -> AnalyzerDescriptor {
    AnalyzerDescriptor {
        id: id.to_string(),
        display_name: display_name.to_string(),
        kind: AnalyzerKind::Neural,
        task,
        artifact: Some(ArtifactRef::new(artifact)),
        estimated_artifact_bytes,
        layout_profile: Some(layout_profile),
        moderation_short_codes,
    }
}

fn builtin_descriptors() -> Vec<AnalyzerDescriptor> {
    vec![
        rule("vader", "VADER (compound)"),
        rule("afinn", "AFINN (lexicon sum)"),
        neural(
            "sentiment-roberta",
            "Twitter-RoBERTa Sentiment",
            AnalyzerTask::Sentiment,
            "cardiffnlp/twitter-roberta-base-sentiment-latest",
            500_000_000,
            LayoutProfile::StandardOnnxSubfolder,
            false,
        ),
        neural(
            "goemotions",
            "GoEmotions (28-way multi-label)",
            AnalyzerTask::Classification,
            "SamLowe/roberta-base-go_emotions-onnx",
            500_000_000,
            LayoutProfile::RootOnnx,
            false,
        ),
        neural(
            "toxic-bert",
            "Toxic-BERT",
            AnalyzerTask::Classification,
            "unitary/toxic-bert",
            440_000_000,
            LayoutProfile::StandardOnnxSubfolder,
            false,
        ),
        neural(
            "lang-detect",
            "XLM-RoBERTa Language Detection",
            AnalyzerTask::Classification,
            "papluca/xlm-roberta-base-language-detection",
            1_100_000_000,
            LayoutProfile::StandardOnnxSubfolder,
            false,
        ),
        neural(
            "moderation",
            "OpenAI-style Moderation",
            AnalyzerTask::Classification,
            "KoalaAI/Text-Moderation",
            500_000_000,
            LayoutProfile::NamedRootOnnx,
            true,
        ),
        neural(
            "topic-classifier",
            "Zero-shot Topic Classifier",
            AnalyzerTask::Classification,
            "facebook/bart-large-mnli",
            1_600_000_000,
            LayoutProfile::StandardOnnxSubfolder,
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_known_and_unknown_ids() {
        let registry = Registry::builtin();
        assert!(registry.get("vader").is_some());
        assert!(registry.get("does-not-exist").is_none());
    }

    #[test]
    fn estimate_bytes_matches_descriptor() {
        let registry = Registry::builtin();
        let descriptor = registry.get("goemotions").unwrap();
        assert_eq!(
            registry.estimate_bytes("goemotions"),
            Some(descriptor.estimated_artifact_bytes)
        );
    }

    #[test]
    fn rule_analyzers_carry_no_artifact() {
        let registry = Registry::builtin();
        for id in ["vader", "afinn"] {
            let d = registry.get(id).unwrap();
            assert_eq!(d.kind, AnalyzerKind::Rule);
            assert!(d.artifact.is_none());
        }
    }
}
