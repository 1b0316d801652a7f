//! Batch ingestion and configuration commands

use docflow_core::{
    BackpressureConfig, BackpressureConfigBuilder, BackpressurePipeline, ConfigError,
    DocumentProcessor, FixedSizeChunker, Priority, ProcessingResult, ProgressCallback,
    StatsSnapshot, TextFileLoader,
};
use docflow_observability::{MetricsError, PipelineMetrics};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by CLI commands
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug)]
pub struct IngestOptions {
    pub paths: Vec<PathBuf>,
    pub priority: Priority,
    pub chunk_size: usize,
    pub overlap: usize,
    pub enqueue_timeout_ms: Option<u64>,
    pub metrics: bool,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct IngestReport<'a> {
    results: &'a [ProcessingResult],
    stats: &'a StatsSnapshot,
}

/// Build the pipeline configuration from the environment plus CLI overrides
fn load_config(enqueue_timeout_ms: Option<u64>) -> Result<BackpressureConfig, ConfigError> {
    let mut builder = BackpressureConfigBuilder::from_env()?;
    if let Some(ms) = enqueue_timeout_ms {
        builder = builder.enqueue_timeout(Some(Duration::from_millis(ms)));
    }
    builder.build()
}

/// Run an ingestion batch. Returns `Ok(false)` when any document failed.
pub async fn run_ingest(options: IngestOptions) -> Result<bool, CliError> {
    let config = load_config(options.enqueue_timeout_ms)?;
    let chunker = Arc::new(FixedSizeChunker::new(options.chunk_size, options.overlap)?);
    let processor = DocumentProcessor::new(
        BackpressurePipeline::new(config),
        Arc::new(TextFileLoader),
    );

    let progress: ProgressCallback = Arc::new(|processed, total| {
        tracing::info!(processed, total, "Ingestion progress");
    });

    let results = processor
        .process_documents_with_backpressure(
            options.paths,
            chunker,
            None,
            options.priority,
            Some(progress),
        )
        .await;
    let stats = processor.pipeline().get_stats();

    if options.json {
        let report = IngestReport {
            results: &results,
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&results, &stats);
    }

    if options.metrics {
        let metrics = PipelineMetrics::new("docflow")?;
        metrics.observe(&stats);
        print!("{}", metrics.render()?);
    }

    Ok(results.iter().all(|r| r.success))
}

fn print_summary(results: &[ProcessingResult], stats: &StatsSnapshot) {
    for result in results {
        if result.success {
            println!(
                "ok    {} ({} chunks, {:.3}s)",
                result.id, result.chunks_created, result.duration_secs
            );
        } else {
            println!(
                "FAIL  {}: {}",
                result.id,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    println!();
    println!("{succeeded}/{} documents ingested", results.len());
    println!(
        "queued={} completed={} failed={} dropped={} max_queue={} workers={}/{} cpu={:.1}%",
        stats.tasks_queued,
        stats.tasks_completed,
        stats.tasks_failed,
        stats.queue_full_count,
        stats.max_queue_size,
        stats.current_workers,
        stats.max_workers,
        stats.cpu_usage
    );
}

/// Print the configuration the pipeline would run with
pub fn print_config() -> Result<bool, CliError> {
    let config = load_config(None)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(true)
}
