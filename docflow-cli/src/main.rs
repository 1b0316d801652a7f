use clap::{Parser, Subcommand};
use docflow_core::Priority;
use docflow_observability::{LogFormat, init_tracing};
use std::path::PathBuf;

mod ingest;

use ingest::{IngestOptions, print_config, run_ingest};

#[derive(Parser, Debug)]
#[command(name = "docflow", version)]
#[command(about = "Docflow CLI - Backpressure-aware document ingestion")]
struct Cli {
    /// Log output format (json, pretty)
    #[arg(long, global = true, default_value = "json")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load, chunk and report on a batch of text files
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Priority of the batch (low, normal, high, critical)
        #[arg(long, default_value = "normal")]
        priority: Priority,
        /// Chunk size in characters
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        /// Characters shared by consecutive chunks
        #[arg(long, default_value_t = 200)]
        overlap: usize,
        /// Admission timeout per file; overrides DOCFLOW_ENQUEUE_TIMEOUT_MS
        #[arg(long)]
        enqueue_timeout_ms: Option<u64>,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective pipeline configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_format, "info") {
        eprintln!("Failed to initialize logging: {e}");
    }

    let outcome = match cli.command {
        Commands::Ingest {
            paths,
            priority,
            chunk_size,
            overlap,
            enqueue_timeout_ms,
            metrics,
            json,
        } => {
            let options = IngestOptions {
                paths,
                priority,
                chunk_size,
                overlap,
                enqueue_timeout_ms,
                metrics,
                json,
            };
            run_ingest(options).await
        }
        Commands::Config => print_config(),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
