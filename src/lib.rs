pub mod config;
pub mod error;
pub mod generation;
pub mod images;
pub mod language;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod table;
pub mod utils;

pub use config::{CliArgs, RunConfig, load_api_key};
pub use error::{CatalogError, CatalogResult};
pub use generation::{ApiKey, GenerationBackend, GenerationOutcome, OpenAiClient};
pub use language::Language;
pub use logging::{LoggingConfig, init_logging, shutdown_telemetry};
pub use metrics::RunMetrics;
pub use pipeline::{BatchOrchestrator, ProgressEvent, ProgressSink, RunSummary};
pub use table::{TableSink, TableSource, XlsxWorkbook};

use anyhow::{Context, Result};
use images::ImageResolver;
use std::sync::Arc;

/// Runs one catalog batch against the generation service described by
/// `config`, then writes the metrics file when one is configured.
pub async fn run_catalog(
    config: RunConfig,
    api_key: ApiKey,
    progress: ProgressSink,
) -> Result<RunSummary> {
    let metrics = Arc::new(RunMetrics::new());
    let client = OpenAiClient::new(config.generation.clone(), api_key, Some(metrics.clone()))?;

    tracing::info!(
        input = %config.input.display(),
        output = %config.output.display(),
        languages = ?config.languages,
        model = %config.generation.model,
        "starting catalog run",
    );

    let orchestrator = BatchOrchestrator::new(
        client,
        ImageResolver::new(&config.images_dir),
        config.pipeline_options(),
    )
    .with_metrics(metrics.clone());

    let result = orchestrator
        .run(
            &XlsxWorkbook::new(&config.input),
            &XlsxWorkbook::new(&config.output),
            &progress,
        )
        .await;

    if let Some(path) = config.metrics_file.as_ref() {
        let text = metrics.encode().context("failed to encode metrics")?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("failed to write metrics file {:?}", path))?;
    }

    Ok(result?)
}
