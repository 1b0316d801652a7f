//! Pipeline statistics.
//!
//! Counters are monotone and updated with atomics so producers, workers and
//! the scaler can record outcomes without sharing a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Shared monotone counters for a pipeline
#[derive(Debug, Default)]
pub struct PipelineStats {
    tasks_queued: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    queue_full_count: AtomicU64,
    worker_adjustments: AtomicU64,
    max_queue_size: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful admission and raise the high-water mark
    pub fn record_queued(&self, occupancy: usize) {
        self.tasks_queued.fetch_add(1, Ordering::Relaxed);
        self.max_queue_size
            .fetch_max(occupancy as u64, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an admission that timed out while the queue was full
    pub fn record_queue_full(&self) {
        self.queue_full_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_adjustment(&self) {
        self.worker_adjustments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tasks_queued(&self) -> u64 {
        self.tasks_queued.load(Ordering::Relaxed)
    }

    pub fn tasks_completed(&self) -> u64 {
        self.tasks_completed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    pub fn queue_full_count(&self) -> u64 {
        self.queue_full_count.load(Ordering::Relaxed)
    }

    pub fn worker_adjustments(&self) -> u64 {
        self.worker_adjustments.load(Ordering::Relaxed)
    }

    pub fn max_queue_size(&self) -> u64 {
        self.max_queue_size.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a pipeline: monotone counters plus live values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub tasks_queued: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub queue_full_count: u64,
    pub max_queue_size: u64,
    pub worker_adjustments: u64,
    pub queue_size: usize,
    pub current_workers: usize,
    pub max_workers: usize,
    pub cpu_usage: f64,
}

impl StatsSnapshot {
    /// True when the monotone counters of both snapshots agree.
    ///
    /// Live fields (`queue_size`, `current_workers`, `cpu_usage`) are ignored.
    pub fn same_counters(&self, other: &Self) -> bool {
        self.tasks_queued == other.tasks_queued
            && self.tasks_completed == other.tasks_completed
            && self.tasks_failed == other.tasks_failed
            && self.queue_full_count == other.queue_full_count
            && self.max_queue_size == other.max_queue_size
            && self.worker_adjustments == other.worker_adjustments
    }
}
