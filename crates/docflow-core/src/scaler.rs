//! CPU-aware dynamic worker scaling.
//!
//! The scaler is the only writer of [`WorkerPoolState`]. Decisions are
//! serialised through the `last_scale_time` mutex; everything that spawns
//! worker loops reads `current_workers` with an atomic load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

use crate::config::BackpressureConfig;
use crate::sampler::CpuSampler;
use crate::stats::PipelineStats;

/// Fraction of the CPU threshold below which the pool may grow
const SCALE_UP_CPU_FACTOR: f64 = 0.6;
/// Queue occupancy above which the pool may grow
const SCALE_UP_OCCUPANCY: f64 = 0.5;

/// Outcome of a scaling check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    Unchanged,
    ScaledUp { from: usize, to: usize },
    ScaledDown { from: usize, to: usize },
}

/// Worker count and the time it last changed
#[derive(Debug)]
pub struct WorkerPoolState {
    current_workers: AtomicUsize,
    last_scale_time: Mutex<Instant>,
}

impl WorkerPoolState {
    fn new(initial_workers: usize) -> Self {
        Self {
            current_workers: AtomicUsize::new(initial_workers),
            last_scale_time: Mutex::new(Instant::now()),
        }
    }

    pub fn current_workers(&self) -> usize {
        self.current_workers.load(Ordering::Acquire)
    }
}

/// Adjusts the worker count from CPU usage and queue occupancy
pub struct DynamicScaler {
    enabled: bool,
    cpu_threshold: f64,
    min_workers: usize,
    max_workers: usize,
    max_queue_depth: usize,
    cooldown: Duration,
    state: WorkerPoolState,
    sampler: Arc<dyn CpuSampler>,
    stats: Arc<PipelineStats>,
}

impl DynamicScaler {
    /// Create a scaler starting at `max_workers`
    pub fn new(
        config: &BackpressureConfig,
        sampler: Arc<dyn CpuSampler>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            enabled: config.enable_dynamic_scaling(),
            cpu_threshold: config.cpu_threshold_percent(),
            min_workers: config.min_workers(),
            max_workers: config.max_workers(),
            max_queue_depth: config.max_queue_depth(),
            cooldown: config.scale_cooldown(),
            state: WorkerPoolState::new(config.max_workers()),
            sampler,
            stats,
        }
    }

    pub fn current_workers(&self) -> usize {
        self.state.current_workers()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Take a CPU reading without making a decision
    pub fn cpu_usage(&self) -> f64 {
        self.sampler.sample()
    }

    /// Re-evaluate the worker count given the current queue length.
    ///
    /// At most one adjustment of one worker happens per cooldown window.
    pub fn maybe_scale(&self, queue_len: usize) -> ScaleDecision {
        if !self.enabled {
            return ScaleDecision::Unchanged;
        }

        let mut last_scale_time = self
            .state
            .last_scale_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last_scale_time.elapsed() < self.cooldown {
            return ScaleDecision::Unchanged;
        }

        let cpu_usage = self.sampler.sample();
        let occupancy = queue_len as f64 / self.max_queue_depth as f64;
        let current = self.state.current_workers();

        let decision = if cpu_usage > self.cpu_threshold && current > self.min_workers {
            ScaleDecision::ScaledDown {
                from: current,
                to: current - 1,
            }
        } else if cpu_usage < SCALE_UP_CPU_FACTOR * self.cpu_threshold
            && occupancy > SCALE_UP_OCCUPANCY
            && current < self.max_workers
        {
            ScaleDecision::ScaledUp {
                from: current,
                to: current + 1,
            }
        } else {
            ScaleDecision::Unchanged
        };

        if let ScaleDecision::ScaledUp { from, to } | ScaleDecision::ScaledDown { from, to } =
            decision
        {
            self.state.current_workers.store(to, Ordering::Release);
            *last_scale_time = Instant::now();
            self.stats.record_worker_adjustment();
            info!(
                from_workers = from,
                to_workers = to,
                cpu_usage,
                queue_occupancy = occupancy,
                "Adjusted worker count"
            );
        }

        decision
    }
}

impl std::fmt::Debug for DynamicScaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicScaler")
            .field("enabled", &self.enabled)
            .field("cpu_threshold", &self.cpu_threshold)
            .field("min_workers", &self.min_workers)
            .field("max_workers", &self.max_workers)
            .field("cooldown", &self.cooldown)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
