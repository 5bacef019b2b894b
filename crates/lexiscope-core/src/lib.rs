//! lexiscope-core: a multi-analyzer text classification engine.
//!
//! Given a batch of input lines and an ordered selection of analyzers
//! (rule-based lexicon scorers and neural transformer classifiers),
//! [`pipeline_driver::PipelineDriver`] produces, for every `(line,
//! analyzer)` pair, a normalized prediction with a display label, a
//! display score, and the full raw class distribution — streamed
//! column-major into a [`result_matrix::ResultMatrix`].
//!
//! This crate has no binary surface; see the `lexiscope-driver` crate for
//! a thin CLI that builds a [`types::Plan`] and streams its results.

pub mod artifact_store;
pub mod cancellation;
pub mod chunker;
pub mod inference_host;
pub mod label_remapper;
pub mod neural_loader;
pub mod output_classifier;
pub mod pipeline_driver;
pub mod registry;
pub mod result_matrix;
pub mod rule_scorer;
pub mod types;

pub use artifact_store::{ArtifactError, ArtifactStore};
pub use cancellation::CancellationToken;
pub use chunker::{AggregationMode, ChunkerConfig};
pub use inference_host::{HostError, HostState, InferenceHost};
pub use neural_loader::{LayoutProfile, NeuralLoaderError};
pub use pipeline_driver::{PipelineConfig, PipelineDriver, PipelineError};
pub use registry::Registry;
pub use result_matrix::ResultMatrix;
pub use types::{
    AnalyzerDescriptor, AnalyzerId, AnalyzerKind, AnalyzerTask, ArtifactRef, CellErrorKind, CellResult,
    EndOfPlanSummary, Family, InputBatch, Plan, PlanOptions, Polarity, PredictionEntry, RawPrediction,
};

/// Crate version, exposed for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience re-exports for downstream crates that want the common
/// surface in one `use`.
pub mod prelude {
    pub use crate::artifact_store::ArtifactStore;
    pub use crate::cancellation::CancellationToken;
    pub use crate::pipeline_driver::{PipelineConfig, PipelineDriver};
    pub use crate::registry::Registry;
    pub use crate::result_matrix::ResultMatrix;
    pub use crate::types::{AnalyzerDescriptor, InputBatch, Plan, PlanOptions};
}
