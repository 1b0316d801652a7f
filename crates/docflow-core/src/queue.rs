//! Bounded, priority-ordered task queue with admission timeouts.
//!
//! [`TaskQueue`] is the seam the pipeline schedules through;
//! [`BoundedPriorityQueue`] is the in-memory implementation. Capacity is
//! enforced with a semaphore of free slots so producers suspend (rather than
//! spin) while the queue is full, and consumers wait on a second semaphore
//! that counts ready items.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::priority::PriorityTask;
use crate::stats::PipelineStats;

/// How long an idle worker waits on the queue before re-checking whether
/// its batch has drained.
pub const DEQUEUE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Multi-producer, multi-consumer queue of prioritised tasks
#[async_trait]
pub trait TaskQueue<T: Send + 'static>: Send + Sync {
    /// Admit a task, waiting up to `timeout` for space (`None` waits indefinitely).
    ///
    /// Returns `false` if the wait timed out; the task is dropped in that case.
    async fn enqueue(&self, task: PriorityTask<T>, timeout: Option<Duration>) -> bool;

    /// Take the highest-ranked task, or `None` if nothing arrives within `timeout`.
    async fn dequeue(&self, timeout: Duration) -> Option<PriorityTask<T>>;

    /// Number of tasks currently stored
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of tasks stored at once
    fn capacity(&self) -> usize;
}

/// Binary-heap backed [`TaskQueue`] bounded to a fixed capacity
pub struct BoundedPriorityQueue<T> {
    heap: Mutex<BinaryHeap<Reverse<PriorityTask<T>>>>,
    free_slots: Semaphore,
    ready_items: Semaphore,
    capacity: usize,
    next_sequence: AtomicU64,
    stats: Arc<PipelineStats>,
}

impl<T> BoundedPriorityQueue<T> {
    pub fn new(capacity: usize, stats: Arc<PipelineStats>) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::with_capacity(capacity)),
            free_slots: Semaphore::new(capacity),
            ready_items: Semaphore::new(0),
            capacity,
            next_sequence: AtomicU64::new(0),
            stats,
        }
    }

    fn heap(&self) -> MutexGuard<'_, BinaryHeap<Reverse<PriorityTask<T>>>> {
        // The heap is only touched by short non-panicking sections.
        self.heap.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T: Send + 'static> TaskQueue<T> for BoundedPriorityQueue<T> {
    async fn enqueue(&self, mut task: PriorityTask<T>, timeout: Option<Duration>) -> bool {
        let acquired = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.free_slots.acquire()).await {
                Ok(acquired) => acquired,
                Err(_) => {
                    self.stats.record_queue_full();
                    debug!(
                        priority = %task.priority(),
                        timeout_ms = limit.as_millis() as u64,
                        capacity = self.capacity,
                        "Queue full, dropping task"
                    );
                    return false;
                }
            },
            None => self.free_slots.acquire().await,
        };

        match acquired {
            Ok(permit) => permit.forget(),
            Err(_) => {
                warn!("Queue semaphore closed, dropping task");
                return false;
            }
        }

        task.stamp_sequence(self.next_sequence.fetch_add(1, Ordering::Relaxed));
        let occupancy = {
            let mut heap = self.heap();
            heap.push(Reverse(task));
            heap.len()
        };
        self.stats.record_queued(occupancy);
        self.ready_items.add_permits(1);
        true
    }

    async fn dequeue(&self, timeout: Duration) -> Option<PriorityTask<T>> {
        let permit = tokio::time::timeout(timeout, self.ready_items.acquire())
            .await
            .ok()?
            .ok()?;
        permit.forget();

        let task = self.heap().pop().map(|Reverse(task)| task);
        self.free_slots.add_permits(1);
        task
    }

    fn len(&self) -> usize {
        self.heap().len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
