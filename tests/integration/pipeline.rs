//! End-to-end tests for the scheduler → dispatch → probe → aggregate → event pipeline

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use watchdog::actors::aggregator::AggregatorHandle;
use watchdog::actors::scheduler::Scheduler;
use watchdog::config::AggregatorConfig;
use watchdog::events::{EventBus, EventKind};
use watchdog::queue::{MemoryQueue, WorkQueue};
use watchdog::storage::{MemoryBackend, Stores, TargetRegistry};
use watchdog::targets::TargetManager;
use watchdog::{HealthStatus, MonitoringFrequency, TargetFilter, WatchdogRuntime};

use crate::helpers::*;

#[tokio::test]
async fn one_tick_with_three_targets_two_workers_chunk_two() {
    let registry = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    let manager = TargetManager::new(registry.clone(), queue.clone());

    for host in ["a", "b", "c"] {
        manager
            .add(new_target(
                &format!("http://{host}.example.com"),
                MonitoringFrequency::TenSeconds,
            ))
            .await
            .unwrap();
    }

    let bus = Arc::new(EventBus::new(8));
    let counter = Arc::new(CountingHandler::default());
    bus.subscribe(EventKind::ProbeSucceeded, counter.clone());
    bus.subscribe(EventKind::ProbeFailed, counter.clone());

    let cancel = CancellationToken::new();
    let (aggregator, aggregator_task) = AggregatorHandle::spawn(
        &AggregatorConfig {
            batch_size: 100,
            flush_interval_secs: 3600,
        },
        bus.clone(),
        cancel.clone(),
    );

    let prober = Arc::new(StubProber::default());
    prober.set("http://b.example.com", false);

    let config = test_config(vec![MonitoringFrequency::TenSeconds], 2, 2);
    let scheduler = Scheduler::start(
        &config.frequencies,
        &config.probe,
        queue.clone(),
        prober.clone(),
        aggregator.intake(),
        cancel.clone(),
    )
    .unwrap();

    assert_eq!(queue.len(MonitoringFrequency::TenSeconds).await.unwrap(), 3);

    let group = scheduler.group(MonitoringFrequency::TenSeconds).unwrap();
    let report = group.dispatch_now().await.unwrap();
    assert_eq!(report.pending, 3);
    assert_eq!(report.chunk_sizes, vec![2, 1]);

    let received_all = wait_until(Duration::from_secs(5), || async {
        aggregator.stats().await.unwrap().received == 3
    })
    .await;
    assert!(received_all, "aggregator should receive three outcomes");
    assert_eq!(group.queued_chunks(), 0);
    assert_eq!(prober.calls(), 3);

    // membership survives the drain
    assert_eq!(queue.len(MonitoringFrequency::TenSeconds).await.unwrap(), 3);

    assert_eq!(aggregator.flush().await.unwrap(), 3);
    bus.wait_idle().await;

    assert_eq!(bus.stats().dispatched, 3);
    assert_eq!(counter.count(), 3);
    let failed: Vec<_> = counter
        .events()
        .into_iter()
        .filter(|event| event.kind == EventKind::ProbeFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].address, "http://b.example.com");

    scheduler.shutdown().await;
    aggregator_task.await.unwrap();
}

#[tokio::test]
async fn empty_queue_tick_is_a_no_op() {
    let queue = Arc::new(MemoryQueue::new());
    let bus = Arc::new(EventBus::new(1));
    let cancel = CancellationToken::new();
    let (aggregator, _task) =
        AggregatorHandle::spawn(&AggregatorConfig::default(), bus, cancel.clone());
    let prober = Arc::new(StubProber::default());

    let config = test_config(vec![MonitoringFrequency::OneMinute], 1, 10);
    let scheduler = Scheduler::start(
        &config.frequencies,
        &config.probe,
        queue,
        prober.clone(),
        aggregator.intake(),
        cancel,
    )
    .unwrap();

    let report = scheduler
        .group(MonitoringFrequency::OneMinute)
        .unwrap()
        .dispatch_now()
        .await
        .unwrap();

    assert_eq!(report.pending, 0);
    assert!(report.chunk_sizes.is_empty());
    assert_eq!(prober.calls(), 0);

    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn runtime_probes_on_schedule_and_updates_status() {
    let backend = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let prober = Arc::new(StubProber::default());

    let up = backend
        .add(new_target("http://up.example.com", MonitoringFrequency::TenSeconds))
        .await
        .unwrap();
    let down = backend
        .add(new_target("http://down.example.com", MonitoringFrequency::TenSeconds))
        .await
        .unwrap();
    let hourly = backend
        .add(new_target("http://hourly.example.com", MonitoringFrequency::OneHour))
        .await
        .unwrap();
    prober.set("http://down.example.com", false);

    let config = test_config(
        vec![MonitoringFrequency::TenSeconds, MonitoringFrequency::OneHour],
        2,
        1,
    );
    let runtime = WatchdogRuntime::start_with_prober(
        &config,
        Stores::from_backend(backend.clone()),
        queue,
        notifier.clone(),
        prober.clone(),
    )
    .await
    .unwrap();

    // first 10s tick, then one aggregator flush
    tokio::time::sleep(Duration::from_secs(12)).await;
    runtime.bus().wait_idle().await;

    assert_eq!(prober.calls(), 2);
    assert_eq!(
        backend.find_by_id(up).await.unwrap().status,
        HealthStatus::Healthy
    );
    assert_eq!(
        backend.find_by_id(down).await.unwrap().status,
        HealthStatus::Unhealthy
    );
    assert_eq!(
        backend.find_by_id(hourly).await.unwrap().status,
        HealthStatus::Pending
    );
    assert!(backend.incidents(down).unwrap().is_empty());
    assert!(notifier.subjects().is_empty());
    assert_eq!(backend.samples(up).unwrap().len(), 1);

    // the healthy target goes down on the next tick
    prober.set("http://up.example.com", false);
    tokio::time::sleep(Duration::from_secs(10)).await;
    runtime.bus().wait_idle().await;

    assert_eq!(notifier.subjects(), vec!["Your site is DOWN".to_string()]);
    assert_eq!(backend.incidents(up).unwrap().len(), 1);

    let unhealthy = backend
        .fetch_all(
            TargetFilter {
                status: Some(HealthStatus::Unhealthy),
                ..TargetFilter::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(unhealthy.len(), 2);

    runtime.shutdown().await;
}

#[tokio::test]
async fn zero_workers_fails_runtime_startup() {
    let backend = Arc::new(MemoryBackend::new());
    let config = test_config(vec![MonitoringFrequency::TenSeconds], 0, 1);

    let result = WatchdogRuntime::start_with_prober(
        &config,
        Stores::from_backend(backend),
        Arc::new(MemoryQueue::new()),
        Arc::new(RecordingNotifier::default()),
        Arc::new(StubProber::default()),
    )
    .await;

    assert!(result.is_err());
}
