//! Task priorities and the total order the queue pops by.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Priority levels for work items
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!(
                "Invalid priority '{}'. Valid values: 'low', 'normal', 'high', 'critical'",
                s
            )),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A payload tagged with its priority and enqueue timestamp.
///
/// Ordering is "pops first is smaller": higher priority sorts before lower
/// priority, and within one priority earlier `enqueued_at` sorts first. The
/// queue stamps an arrival `sequence` on admission which breaks any remaining
/// tie, so two distinct admitted tasks never compare equal.
#[derive(Debug)]
pub struct PriorityTask<T> {
    priority: Priority,
    payload: T,
    enqueued_at: Instant,
    sequence: u64,
}

impl<T> PriorityTask<T> {
    pub fn new(payload: T, priority: Priority) -> Self {
        Self {
            priority,
            payload,
            enqueued_at: Instant::now(),
            sequence: 0,
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Time spent since the task was created
    pub fn waited(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub(crate) fn stamp_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }
}

impl<T> PartialEq for PriorityTask<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for PriorityTask<T> {}

impl<T> PartialOrd for PriorityTask<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PriorityTask<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.enqueued_at.cmp(&other.enqueued_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    #[test]
    fn test_priority_from_str() {
        assert_eq!("low".parse::<Priority>().unwrap(), Priority::Low);
        assert_eq!("Normal".parse::<Priority>().unwrap(), Priority::Normal);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("critical".parse::<Priority>().unwrap(), Priority::Critical);

        let err = "urgent".parse::<Priority>().unwrap_err();
        assert!(err.contains("Invalid priority"));
        assert!(err.contains("'urgent'"));
    }

    #[test]
    fn test_priority_display_round_trips() {
        for priority in [
            Priority::Low,
            Priority::Normal,
            Priority::High,
            Priority::Critical,
        ] {
            assert_eq!(priority.to_string().parse::<Priority>().unwrap(), priority);
        }
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_higher_priority_sorts_first() {
        let low = PriorityTask::new("low", Priority::Low);
        let critical = PriorityTask::new("critical", Priority::Critical);
        assert!(critical < low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fifo_within_priority() {
        let first = PriorityTask::new(1, Priority::High);
        tokio::time::advance(Duration::from_millis(5)).await;
        let second = PriorityTask::new(2, Priority::High);
        assert!(first < second);

        // An older low-priority task still loses to a newer high-priority one
        let old_low = PriorityTask::new(0, Priority::Low);
        tokio::time::advance(Duration::from_millis(5)).await;
        let new_high = PriorityTask::new(3, Priority::High);
        assert!(new_high < old_low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_breaks_timestamp_ties() {
        let mut a = PriorityTask::new("a", Priority::Normal);
        let mut b = PriorityTask::new("b", Priority::Normal);
        a.stamp_sequence(2);
        b.stamp_sequence(1);
        assert_eq!(a.enqueued_at(), b.enqueued_at());
        assert!(b < a);
        assert_ne!(a, b);
    }

    fn priority_strategy() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::Low),
            Just(Priority::Normal),
            Just(Priority::High),
            Just(Priority::Critical),
        ]
    }

    proptest! {
        #[test]
        fn prop_sorted_tasks_are_priority_then_arrival(
            priorities in proptest::collection::vec(priority_strategy(), 1..64)
        ) {
            let base = Instant::now();
            let mut tasks: Vec<PriorityTask<usize>> = priorities
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let mut task = PriorityTask::new(i, *p);
                    task.enqueued_at = base;
                    task.stamp_sequence(i as u64);
                    task
                })
                .collect();
            tasks.sort();

            for pair in tasks.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.priority() >= b.priority());
                if a.priority() == b.priority() {
                    prop_assert!(a.sequence() < b.sequence());
                }
            }
        }
    }
}
