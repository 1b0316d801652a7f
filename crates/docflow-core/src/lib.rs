//! # Docflow Core
//!
//! Backpressure-aware task pipeline for document ingestion.
//!
//! Batches of work items flow through a bounded priority queue into a pool of
//! worker loops whose size adapts to CPU load. A concurrency limiter caps how
//! many items execute at once, and admission timeouts shed load when the
//! queue stays full.
//!
//! ## Features
//!
//! - **Priority admission**: `Critical > High > Normal > Low`, FIFO within a priority
//! - **Bounded queue**: producers wait for space, optionally with a timeout
//! - **Concurrency limiting**: RAII permits released on every exit path
//! - **Dynamic scaling**: one worker up or down per cooldown window
//! - **Statistics**: lock-free counters with serializable snapshots
//!
//! ## Example
//!
//! ```rust,no_run
//! use docflow_core::{BackpressureConfig, BackpressurePipeline, Priority};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BackpressureConfig::builder()
//!         .max_queue_depth(50)
//!         .max_concurrent_tasks(4)
//!         .build()?;
//!     let pipeline = BackpressurePipeline::new(config);
//!
//!     let results = pipeline
//!         .process_with_backpressure(
//!             vec![1, 2, 3],
//!             |x: u32| Ok::<_, String>(x * 10),
//!             Priority::High,
//!             None,
//!         )
//!         .await;
//!     assert_eq!(results, vec![Some(10), Some(20), Some(30)]);
//!     println!("{:?}", pipeline.get_stats());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod documents;
pub mod error;
pub mod limiter;
pub mod pipeline;
pub mod priority;
pub mod queue;
pub mod sampler;
pub mod scaler;
pub mod stats;

pub use config::{
    BackpressureConfig, BackpressureConfigBuilder, ConcurrencyLimit, CpuThreshold, QueueDepth,
};
pub use documents::{
    Chunk, Chunker, Document, DocumentLoader, DocumentProcessor, Embedder, Embedding,
    FixedSizeChunker, ProcessingResult, TextFileLoader,
};
pub use error::{ConfigError, DocumentError, TaskError};
pub use limiter::{ConcurrencyLimiter, ExecutionPermit};
pub use pipeline::{BackpressurePipeline, ProgressCallback};
pub use priority::{Priority, PriorityTask};
pub use queue::{BoundedPriorityQueue, DEQUEUE_POLL_INTERVAL, TaskQueue};
pub use sampler::{CpuSampler, StaticCpuSampler, SystemCpuSampler};
pub use scaler::{DynamicScaler, ScaleDecision, WorkerPoolState};
pub use stats::{PipelineStats, StatsSnapshot};
