//! End-to-end behaviour of the backpressure pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docflow_core::{
    BackpressureConfig, BackpressurePipeline, BoundedPriorityQueue, PipelineStats, Priority,
    PriorityTask, StaticCpuSampler, TaskQueue,
};

fn pipeline_with_cpu(config: BackpressureConfig, cpu: f64) -> BackpressurePipeline {
    BackpressurePipeline::with_sampler(config, Arc::new(StaticCpuSampler::new(cpu)))
}

#[tokio::test]
async fn test_full_queue_rejects_after_timeout() {
    let config = BackpressureConfig::builder()
        .max_queue_depth(2)
        .max_concurrent_tasks(1)
        .build()
        .expect("valid config");
    let stats = Arc::new(PipelineStats::new());
    let queue = BoundedPriorityQueue::new(config.max_queue_depth(), Arc::clone(&stats));
    let timeout = Some(Duration::from_millis(100));

    assert!(queue.enqueue(PriorityTask::new("a", Priority::Normal), timeout).await);
    assert!(queue.enqueue(PriorityTask::new("b", Priority::Normal), timeout).await);
    assert!(!queue.enqueue(PriorityTask::new("c", Priority::Normal), timeout).await);

    assert_eq!(stats.queue_full_count(), 1);
    assert_eq!(stats.tasks_queued(), 2);
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn test_results_are_index_aligned() {
    let pipeline = pipeline_with_cpu(BackpressureConfig::default(), 20.0);
    let results = pipeline
        .process_with_backpressure(
            vec![0, 1, 2, 3, 4],
            |x: i64| Ok::<_, String>(x * 2),
            Priority::Normal,
            None,
        )
        .await;

    assert_eq!(results, vec![Some(0), Some(2), Some(4), Some(6), Some(8)]);
}

#[tokio::test]
async fn test_single_failure_leaves_gap() {
    let pipeline = pipeline_with_cpu(BackpressureConfig::default(), 20.0);
    let results = pipeline
        .process_with_backpressure(
            vec![10, 11, 12, 13, 14],
            |x: i64| {
                if x == 12 {
                    Err("bad input".to_string())
                } else {
                    Ok(x * 3)
                }
            },
            Priority::High,
            None,
        )
        .await;

    assert_eq!(results, vec![Some(30), Some(33), None, Some(39), Some(42)]);
    let stats = pipeline.get_stats();
    assert_eq!(stats.tasks_failed, 1);
    assert_eq!(stats.tasks_completed, 4);
}

#[tokio::test]
async fn test_empty_input_changes_nothing() {
    let pipeline = pipeline_with_cpu(BackpressureConfig::default(), 20.0);
    let before = pipeline.get_stats();

    let results = pipeline
        .process_with_backpressure(
            Vec::<u8>::new(),
            |x: u8| Ok::<_, String>(x),
            Priority::Critical,
            None,
        )
        .await;

    assert!(results.is_empty());
    let after = pipeline.get_stats();
    assert!(before.same_counters(&after));
    assert_eq!(after.tasks_queued, 0);
    assert_eq!(after.worker_adjustments, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_consumer_drops_items_on_enqueue_timeout() {
    let config = BackpressureConfig::builder()
        .max_queue_depth(1)
        .max_concurrent_tasks(1)
        .workers(1, 1)
        .enqueue_timeout(Some(Duration::from_millis(100)))
        .build()
        .expect("valid config");
    let pipeline = pipeline_with_cpu(config, 20.0);

    let results = pipeline
        .process_with_backpressure(
            (0..5).collect(),
            |x: u32| {
                std::thread::sleep(Duration::from_millis(600));
                Ok::<_, String>(x)
            },
            Priority::Normal,
            None,
        )
        .await;

    assert_eq!(results, vec![Some(0), Some(1), None, None, None]);
    let stats = pipeline.get_stats();
    assert_eq!(stats.queue_full_count, 3);
    assert_eq!(stats.tasks_queued, 2);
    assert_eq!(stats.tasks_completed, 2);
    assert_eq!(stats.max_queue_size, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_high_cpu_shrinks_pool_for_later_batches() {
    let config = BackpressureConfig::builder()
        .workers(1, 4)
        .scale_cooldown(Duration::ZERO)
        .build()
        .expect("valid config");
    let pipeline = pipeline_with_cpu(config, 95.0);
    assert_eq!(pipeline.current_workers(), 4);

    let results = pipeline
        .process_with_backpressure(
            (0..10).collect(),
            |x: u32| Ok::<_, String>(x),
            Priority::Normal,
            None,
        )
        .await;

    assert!(results.iter().all(Option::is_some));
    assert_eq!(pipeline.current_workers(), 1);
    let stats = pipeline.get_stats();
    assert_eq!(stats.worker_adjustments, 3);
    assert_eq!(stats.current_workers, 1);
    assert_eq!(stats.max_workers, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_batches_share_one_pipeline() {
    let config = BackpressureConfig::builder()
        .max_queue_depth(4)
        .max_concurrent_tasks(3)
        .workers(2, 2)
        .build()
        .expect("valid config");
    let pipeline = pipeline_with_cpu(config, 20.0);

    let first = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .process_with_backpressure(
                    (0..30).collect(),
                    |x: u64| Ok::<_, String>(x + 1000),
                    Priority::Low,
                    None,
                )
                .await
        })
    };
    let second = {
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            pipeline
                .process_async_with_backpressure(
                    (0..30).collect(),
                    |x: u64| async move { Ok::<_, String>(x + 2000) },
                    Priority::Critical,
                    None,
                )
                .await
        })
    };

    let first = first.await.expect("first batch task");
    let second = second.await.expect("second batch task");
    assert_eq!(first, (0..30).map(|x| Some(x + 1000)).collect::<Vec<_>>());
    assert_eq!(second, (0..30).map(|x| Some(x + 2000)).collect::<Vec<_>>());

    let stats = pipeline.get_stats();
    assert_eq!(stats.tasks_completed, 60);
    assert_eq!(stats.queue_size, 0);
    assert!(stats.max_queue_size <= 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_every_item_runs_exactly_once() {
    let config = BackpressureConfig::builder()
        .max_queue_depth(5)
        .max_concurrent_tasks(4)
        .workers(3, 3)
        .build()
        .expect("valid config");
    let pipeline = pipeline_with_cpu(config, 20.0);
    let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect());

    let results = {
        let counts = Arc::clone(&counts);
        pipeline
            .process_with_backpressure(
                (0..100).collect(),
                move |i: usize| {
                    counts[i].fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(i)
                },
                Priority::Normal,
                None,
            )
            .await
    };

    assert_eq!(results, (0..100).map(Some).collect::<Vec<_>>());
    assert!(counts.iter().all(|c| c.load(Ordering::SeqCst) == 1));
}

#[tokio::test]
async fn test_stats_snapshot_serializes() {
    let pipeline = pipeline_with_cpu(BackpressureConfig::default(), 33.0);
    pipeline
        .process_with_backpressure(vec![1], |x: i32| Ok::<_, String>(x), Priority::Low, None)
        .await;

    let json = serde_json::to_value(pipeline.get_stats()).expect("serializable");
    assert_eq!(json["tasks_completed"], 1);
    assert_eq!(json["cpu_usage"], 33.0);
}
