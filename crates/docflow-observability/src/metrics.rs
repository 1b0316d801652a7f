//! Prometheus export of pipeline statistics
//!
//! [`PipelineMetrics`] owns its registry so several pipelines (or tests) can
//! export side by side without clashing in the process-wide default registry.

use docflow_core::StatsSnapshot;
use prometheus::{Gauge, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Gauges mirroring a [`StatsSnapshot`]
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    tasks_queued: IntGauge,
    tasks_completed: IntGauge,
    tasks_failed: IntGauge,
    queue_full_count: IntGauge,
    max_queue_size: IntGauge,
    worker_adjustments: IntGauge,
    queue_size: IntGauge,
    current_workers: IntGauge,
    max_workers: IntGauge,
    cpu_usage_percent: Gauge,
}

impl PipelineMetrics {
    /// Register all pipeline gauges under `namespace`
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let int_gauge = |name: &str, help: &str| -> Result<IntGauge, MetricsError> {
            let gauge = IntGauge::with_opts(Opts::new(format!("{namespace}_{name}"), help))?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let tasks_queued = int_gauge("tasks_queued_total", "Tasks admitted into the queue")?;
        let tasks_completed =
            int_gauge("tasks_completed_total", "Tasks whose work function succeeded")?;
        let tasks_failed = int_gauge(
            "tasks_failed_total",
            "Tasks whose work function returned an error or panicked",
        )?;
        let queue_full_count = int_gauge(
            "queue_full_total",
            "Tasks dropped because admission timed out on a full queue",
        )?;
        let max_queue_size = int_gauge("queue_size_max", "Highest observed queue occupancy")?;
        let worker_adjustments =
            int_gauge("worker_adjustments_total", "Worker count changes made by the scaler")?;
        let queue_size = int_gauge("queue_size", "Tasks currently waiting in the queue")?;
        let current_workers = int_gauge("workers_current", "Worker count for the next batch")?;
        let max_workers = int_gauge("workers_max", "Upper bound on the worker count")?;

        let cpu_usage_percent = Gauge::with_opts(Opts::new(
            format!("{namespace}_cpu_usage_percent"),
            "Host CPU usage at the last snapshot",
        ))?;
        registry.register(Box::new(cpu_usage_percent.clone()))?;

        Ok(Self {
            registry,
            tasks_queued,
            tasks_completed,
            tasks_failed,
            queue_full_count,
            max_queue_size,
            worker_adjustments,
            queue_size,
            current_workers,
            max_workers,
            cpu_usage_percent,
        })
    }

    /// Copy a snapshot into the gauges
    pub fn observe(&self, snapshot: &StatsSnapshot) {
        self.tasks_queued.set(saturating_i64(snapshot.tasks_queued));
        self.tasks_completed
            .set(saturating_i64(snapshot.tasks_completed));
        self.tasks_failed.set(saturating_i64(snapshot.tasks_failed));
        self.queue_full_count
            .set(saturating_i64(snapshot.queue_full_count));
        self.max_queue_size.set(saturating_i64(snapshot.max_queue_size));
        self.worker_adjustments
            .set(saturating_i64(snapshot.worker_adjustments));
        self.queue_size.set(saturating_i64(snapshot.queue_size as u64));
        self.current_workers
            .set(saturating_i64(snapshot.current_workers as u64));
        self.max_workers
            .set(saturating_i64(snapshot.max_workers as u64));
        self.cpu_usage_percent.set(snapshot.cpu_usage);
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        Ok(encoder.encode_to_string(&metric_families)?)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Metrics errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}
