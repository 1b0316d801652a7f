//! # Backpressure Pipeline
//!
//! Runs batches of work items through a bounded priority queue, a pool of
//! worker loops and a concurrency limiter, adapting the worker count to CPU
//! load between batches.
//!
//! Each batch:
//! 1. spawns `current_workers` worker loops (fixed for the batch),
//! 2. admits every item into the shared queue, dropping items whose
//!    admission times out,
//! 3. waits until every item is completed, failed or dropped,
//! 4. signals its workers to stop and waits for them to exit.
//!
//! Work functions never abort a batch: errors and panics are logged,
//! counted and surface as `None` in the item's result slot.

use std::fmt::Display;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use tokio::sync::{oneshot, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::BackpressureConfig;
use crate::error::TaskError;
use crate::limiter::ConcurrencyLimiter;
use crate::priority::{Priority, PriorityTask};
use crate::queue::{BoundedPriorityQueue, DEQUEUE_POLL_INTERVAL, TaskQueue};
use crate::sampler::{CpuSampler, SystemCpuSampler};
use crate::scaler::DynamicScaler;
use crate::stats::{PipelineStats, StatsSnapshot};

/// Callback receiving `(processed, total)` after each item finishes executing
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Per-batch bookkeeping shared by the orchestrator and the workers
struct BatchState {
    id: u64,
    total: usize,
    processed: AtomicUsize,
    settled: watch::Sender<usize>,
    progress: Option<ProgressCallback>,
    cancelled: AtomicBool,
}

impl BatchState {
    fn new(id: u64, total: usize, progress: Option<ProgressCallback>) -> Self {
        let (settled, _) = watch::channel(0);
        Self {
            id,
            total,
            processed: AtomicUsize::new(0),
            settled,
            progress,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Mark one item as having reached a terminal state
    fn settle(&self) {
        self.settled.send_modify(|count| *count += 1);
    }

    fn record_processed(&self) {
        let processed = self.processed.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(progress) = &self.progress
            && catch_unwind(AssertUnwindSafe(|| progress(processed, self.total))).is_err()
        {
            warn!(
                batch_id = self.id,
                processed,
                total = self.total,
                "Progress callback panicked"
            );
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Settles one item of a batch when dropped, whichever way execution ends
struct SettleOnDrop<'a>(&'a BatchState);

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.settle();
    }
}

/// Marks a batch cancelled if its orchestrator is dropped before the batch drains.
///
/// Jobs of a cancelled batch still in the queue are discarded by whichever
/// worker pops them instead of being executed.
struct CancelOnDrop {
    batch: Arc<BatchState>,
    armed: bool,
}

impl CancelOnDrop {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.batch.cancelled.store(true, Ordering::Release);
            warn!(batch_id = self.batch.id, "Batch abandoned before completion");
        }
    }
}

/// A queued unit of work. Its future delivers the item's value on success.
struct Job {
    index: usize,
    batch: Arc<BatchState>,
    work: BoxFuture<'static, Result<(), TaskError>>,
}

struct PipelineInner {
    config: BackpressureConfig,
    queue: BoundedPriorityQueue<Job>,
    limiter: ConcurrencyLimiter,
    scaler: DynamicScaler,
    stats: Arc<PipelineStats>,
    next_batch_id: AtomicU64,
}

impl PipelineInner {
    /// Scale check, limiter admission, execution and outcome recording
    async fn execute(&self, task: PriorityTask<Job>) {
        let waited = task.waited();
        let priority = task.priority();
        let Job { index, batch, work } = task.into_payload();
        let _settle = SettleOnDrop(&batch);

        if batch.is_cancelled() {
            debug!(batch_id = batch.id, index, "Discarding task of abandoned batch");
            return;
        }

        self.scaler.maybe_scale(self.queue.len());

        let outcome = match self.limiter.acquire().await {
            Ok(_permit) => {
                debug!(
                    batch_id = batch.id,
                    index,
                    %priority,
                    waited_ms = waited.as_millis() as u64,
                    "Executing task"
                );
                work.await
            }
            Err(e) => Err(TaskError::Failed(format!("concurrency limiter closed: {e}"))),
        };

        match outcome {
            Ok(()) => self.stats.record_completed(),
            Err(error) => {
                self.stats.record_failed();
                warn!(
                    batch_id = batch.id,
                    index,
                    error = %error,
                    "Task failed"
                );
            }
        }

        batch.record_processed();
    }

    async fn worker_loop(
        self: Arc<Self>,
        batch: Arc<BatchState>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let drained = batch.settled.subscribe();
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                next = self.queue.dequeue(DEQUEUE_POLL_INTERVAL) => next,
            };

            match next {
                Some(task) => self.execute(task).await,
                None => {
                    let batch_drained = *drained.borrow() >= batch.total;
                    if batch_drained {
                        break;
                    }
                }
            }
        }
        debug!("Worker exiting");
    }
}

/// Concurrent task pipeline with priority admission control, bounded-queue
/// backpressure and CPU-aware worker scaling.
///
/// The queue, limiter, scaler and statistics live as long as the pipeline
/// and are shared by every batch run through it.
#[derive(Clone)]
pub struct BackpressurePipeline {
    inner: Arc<PipelineInner>,
}

impl BackpressurePipeline {
    /// Create a pipeline sampling the host CPU
    pub fn new(config: BackpressureConfig) -> Self {
        Self::with_sampler(config, Arc::new(SystemCpuSampler::new()))
    }

    /// Create a pipeline with an injected CPU sampler
    pub fn with_sampler(config: BackpressureConfig, sampler: Arc<dyn CpuSampler>) -> Self {
        let stats = Arc::new(PipelineStats::new());
        let queue = BoundedPriorityQueue::new(config.max_queue_depth(), Arc::clone(&stats));
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_tasks());
        let scaler = DynamicScaler::new(&config, sampler, Arc::clone(&stats));

        info!(
            max_queue_depth = config.max_queue_depth(),
            max_concurrent_tasks = config.max_concurrent_tasks(),
            min_workers = config.min_workers(),
            max_workers = config.max_workers(),
            dynamic_scaling = config.enable_dynamic_scaling(),
            "Backpressure pipeline created"
        );

        Self {
            inner: Arc::new(PipelineInner {
                config,
                queue,
                limiter,
                scaler,
                stats,
                next_batch_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &BackpressureConfig {
        &self.inner.config
    }

    /// Worker count the next batch will start with
    pub fn current_workers(&self) -> usize {
        self.inner.scaler.current_workers()
    }

    /// Process `items` with a blocking work function.
    ///
    /// `process_fn` runs on tokio's blocking pool so slow work never stalls
    /// queue polling. The result has one entry per input, in input order:
    /// `Some` for a success, `None` for a failure, panic or backpressure drop.
    pub async fn process_with_backpressure<T, R, E, F>(
        &self,
        items: Vec<T>,
        process_fn: F,
        priority: Priority,
        progress: Option<ProgressCallback>,
    ) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(T) -> Result<R, E> + Send + Sync + 'static,
    {
        let process_fn = Arc::new(process_fn);
        let units = items
            .into_iter()
            .map(|item| {
                let process_fn = Arc::clone(&process_fn);
                async move {
                    tokio::task::spawn_blocking(move || process_fn(item))
                        .await
                        .map_err(TaskError::from_join)?
                        .map_err(|e| TaskError::Failed(e.to_string()))
                }
                .boxed()
            })
            .collect();

        self.run_batch(units, priority, progress).await
    }

    /// Process `items` with an async work function.
    ///
    /// Each invocation runs as its own task, so a panic inside it is reported
    /// as a failure of that item only.
    pub async fn process_async_with_backpressure<T, R, E, F, Fut>(
        &self,
        items: Vec<T>,
        process_fn: F,
        priority: Priority,
        progress: Option<ProgressCallback>,
    ) -> Vec<Option<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Display + Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let process_fn = Arc::new(process_fn);
        let units = items
            .into_iter()
            .map(|item| {
                let process_fn = Arc::clone(&process_fn);
                async move {
                    tokio::spawn(process_fn(item))
                        .await
                        .map_err(TaskError::from_join)?
                        .map_err(|e| TaskError::Failed(e.to_string()))
                }
                .boxed()
            })
            .collect();

        self.run_batch(units, priority, progress).await
    }

    async fn run_batch<R: Send + 'static>(
        &self,
        units: Vec<BoxFuture<'static, Result<R, TaskError>>>,
        priority: Priority,
        progress: Option<ProgressCallback>,
    ) -> Vec<Option<R>> {
        if units.is_empty() {
            return Vec::new();
        }

        let total = units.len();
        let batch_id = self.inner.next_batch_id.fetch_add(1, Ordering::Relaxed);
        let batch = Arc::new(BatchState::new(batch_id, total, progress));
        let mut settled = batch.settled.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel_guard = CancelOnDrop {
            batch: Arc::clone(&batch),
            armed: true,
        };

        // Workers start before admission so a batch larger than the queue
        // can drain while later items are still waiting for space.
        let worker_count = self.inner.scaler.current_workers();
        info!(batch_id, items = total, workers = worker_count, %priority, "Starting batch");
        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(
                    inner
                        .worker_loop(Arc::clone(&batch), shutdown_rx.clone())
                        .instrument(info_span!("worker", batch_id, worker_id)),
                )
            })
            .collect();

        let enqueue_timeout = self.inner.config.enqueue_timeout();
        let mut receivers = Vec::with_capacity(total);
        for (index, unit) in units.into_iter().enumerate() {
            let (tx, rx) = oneshot::channel();
            receivers.push(rx);

            let job = Job {
                index,
                batch: Arc::clone(&batch),
                work: async move {
                    let value = unit.await?;
                    // The receiver is held by the orchestrator until the batch drains.
                    let _ = tx.send(value);
                    Ok(())
                }
                .boxed(),
            };

            let admitted = self
                .inner
                .queue
                .enqueue(PriorityTask::new(job, priority), enqueue_timeout)
                .await;
            if !admitted {
                warn!(batch_id, index, "Queue full, item dropped");
                batch.settle();
            }
        }

        // The sender lives in `batch`, so this only returns once every item settled.
        let _ = settled.wait_for(|count| *count >= total).await;
        cancel_guard.disarm();

        let _ = shutdown_tx.send(true);
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                warn!(batch_id, error = %e, "Worker terminated abnormally");
            }
        }

        let results: Vec<Option<R>> = receivers
            .into_iter()
            .map(|mut rx| rx.try_recv().ok())
            .collect();
        let succeeded = results.iter().filter(|r| r.is_some()).count();
        info!(
            batch_id,
            items = total,
            succeeded,
            unsuccessful = total - succeeded,
            "Batch finished"
        );
        results
    }

    /// Snapshot of counters plus live queue, worker and CPU readings
    pub fn get_stats(&self) -> StatsSnapshot {
        let stats = &self.inner.stats;
        StatsSnapshot {
            tasks_queued: stats.tasks_queued(),
            tasks_completed: stats.tasks_completed(),
            tasks_failed: stats.tasks_failed(),
            queue_full_count: stats.queue_full_count(),
            max_queue_size: stats.max_queue_size(),
            worker_adjustments: stats.worker_adjustments(),
            queue_size: self.inner.queue.len(),
            current_workers: self.inner.scaler.current_workers(),
            max_workers: self.inner.scaler.max_workers(),
            cpu_usage: self.inner.scaler.cpu_usage(),
        }
    }
}

impl std::fmt::Debug for BackpressurePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackpressurePipeline")
            .field("config", &self.inner.config)
            .field("queue_size", &self.inner.queue.len())
            .field("concurrency_limit", &self.inner.limiter.limit())
            .field("min_workers", &self.inner.scaler.min_workers())
            .field("current_workers", &self.inner.scaler.current_workers())
            .finish_non_exhaustive()
    }
}
