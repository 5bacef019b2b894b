//! Thin CLI driver for lexiscope-core.
//!
//! Reads lines from a file (or stdin), builds a [`Plan`] from the
//! requested analyzer ids, runs it through [`PipelineDriver`], and streams
//! `(lineIndex, analyzerId, CellResult)` transitions to stdout as
//! newline-delimited JSON as they arrive. Structured logs go to stderr so
//! stdout stays clean NDJSON — the presentation layer this driver feeds is
//! out of scope for the core.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lexiscope_core::{
    AnalyzerDescriptor, ArtifactStore, CancellationToken, InputBatch, Plan, PlanOptions, PipelineConfig,
    PipelineDriver, Registry,
};

#[derive(Parser, Debug)]
#[command(
    name = "lexiscope",
    author,
    version,
    about = "Run a multi-analyzer text classification plan and stream results as NDJSON"
)]
struct Cli {
    /// Analyzer ids to run, in order (e.g. `vader`, `goemotions`). Repeat
    /// the flag to run more than one.
    #[arg(short = 'a', long = "analyzer", required = true)]
    analyzers: Vec<String>,

    /// Input file, one line of text per line. Reads stdin if omitted.
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Cache root for the artifact store. Defaults to the platform cache
    /// directory resolution `ArtifactStore` uses internally.
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// Keep neural model hosts resident between analyzers instead of
    /// terminating after each column.
    #[arg(long = "keep-resident", default_value_t = false)]
    keep_artifacts_resident: bool,

    /// Remote host artifacts are fetched from.
    #[arg(long = "remote-host", default_value = "huggingface.co")]
    remote_host: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!(error = %err, "lexiscope run failed");
        std::process::exit(1);
    }
}

#[derive(Debug, thiserror::Error)]
enum DriverError {
    #[error("unknown analyzer id: {0}")]
    UnknownAnalyzer(String),
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Artifact(#[from] lexiscope_core::ArtifactError),
    #[error(transparent)]
    Pipeline(#[from] lexiscope_core::PipelineError),
}

async fn run(cli: Cli) -> Result<(), DriverError> {
    let lines = read_lines(cli.input.as_deref())?;
    if lines.is_empty() {
        info!("no input lines, nothing to do");
        return Ok(());
    }

    let registry = Registry::builtin();
    let descriptors: Vec<AnalyzerDescriptor> = cli
        .analyzers
        .iter()
        .map(|id| {
            registry
                .get(id)
                .cloned()
                .ok_or_else(|| DriverError::UnknownAnalyzer(id.clone()))
        })
        .collect::<Result<_, _>>()?;

    let cache_root = cli
        .cache_dir
        .unwrap_or_else(lexiscope_core::artifact_store::resolve_cache_root);
    let store = ArtifactStore::open(cache_root)?;

    let config = PipelineConfig {
        remote_host: cli.remote_host,
        ..PipelineConfig::default()
    };

    let driver = Arc::new(PipelineDriver::new(config, store, registry));
    let plan = Plan {
        batch: InputBatch::new(lines),
        analyzers: descriptors,
        options: PlanOptions {
            keep_artifacts_resident: cli.keep_artifacts_resident,
            classification_expansion: false,
        },
    };

    info!(analyzer_count = plan.analyzers.len(), line_count = plan.batch.len(), "starting plan");

    let (matrix, summary) = driver.run(plan, CancellationToken::new()).await?;
    emit_ndjson(&matrix)?;

    info!(
        completed = summary.completed_cells,
        failed = summary.failed_cells,
        host_terminations = summary.host_terminations,
        elapsed_micros = summary.total_elapsed_micros,
        cancelled = summary.cancelled,
        "plan finished"
    );

    Ok(())
}

fn read_lines(path: Option<&std::path::Path>) -> io::Result<Vec<String>> {
    let raw: Box<dyn BufRead> = match path {
        Some(p) => Box::new(io::BufReader::new(std::fs::File::open(p)?)),
        None => Box::new(io::BufReader::new(io::stdin())),
    };
    raw.lines()
        .collect::<io::Result<Vec<String>>>()
        .map(|lines| lines.into_iter().filter(|l| !l.is_empty()).collect())
}

fn emit_ndjson(matrix: &lexiscope_core::ResultMatrix) -> io::Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let snapshot = matrix.snapshot();

    for line_index in 0..matrix.line_count() {
        for (analyzer_index, analyzer_id) in snapshot.analyzer_ids.iter().enumerate() {
            let cell = &snapshot.cells[line_index][analyzer_index];
            let record = serde_json::json!({
                "lineIndex": line_index,
                "analyzerId": analyzer_id,
                "cell": cell,
            });
            writeln!(handle, "{}", serde_json::to_string(&record)?)?;
        }
    }

    Ok(())
}
