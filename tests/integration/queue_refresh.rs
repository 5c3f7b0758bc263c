//! Queue refresh against the registry

use std::sync::Arc;

use pretty_assertions::assert_eq;
use watchdog::queue::{MemoryQueue, WorkQueue, refresh_all, refresh_frequency};
use watchdog::storage::{MemoryBackend, TargetRegistry};
use watchdog::targets::TargetManager;
use watchdog::{HealthStatus, MonitoringFrequency};

use crate::helpers::new_target;

#[tokio::test]
async fn refresh_is_idempotent() {
    let registry = MemoryBackend::new();
    let queue = MemoryQueue::new();
    for i in 0..7 {
        registry
            .add(new_target(
                &format!("https://{i}.example.com"),
                MonitoringFrequency::ThirtySeconds,
            ))
            .await
            .unwrap();
    }

    refresh_frequency(&registry, &queue, MonitoringFrequency::ThirtySeconds)
        .await
        .unwrap();
    let first_list = queue
        .pending(MonitoringFrequency::ThirtySeconds)
        .await
        .unwrap();
    let first_map = queue
        .snapshot_map(MonitoringFrequency::ThirtySeconds)
        .unwrap();

    refresh_frequency(&registry, &queue, MonitoringFrequency::ThirtySeconds)
        .await
        .unwrap();

    assert_eq!(
        queue
            .pending(MonitoringFrequency::ThirtySeconds)
            .await
            .unwrap(),
        first_list
    );
    assert_eq!(
        queue
            .snapshot_map(MonitoringFrequency::ThirtySeconds)
            .unwrap(),
        first_map
    );
    assert_eq!(first_list.len(), 7);
}

#[tokio::test]
async fn snapshots_follow_status_changes() {
    let registry = MemoryBackend::new();
    let queue = MemoryQueue::new();
    let id = registry
        .add(new_target("https://api.example.com", MonitoringFrequency::OneMinute))
        .await
        .unwrap();

    refresh_frequency(&registry, &queue, MonitoringFrequency::OneMinute)
        .await
        .unwrap();
    let before = queue
        .snapshot(MonitoringFrequency::OneMinute, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.status, HealthStatus::Pending);

    registry
        .update_status(id, HealthStatus::Healthy)
        .await
        .unwrap();
    refresh_frequency(&registry, &queue, MonitoringFrequency::OneMinute)
        .await
        .unwrap();

    let after = queue
        .snapshot(MonitoringFrequency::OneMinute, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, HealthStatus::Healthy);
}

#[tokio::test]
async fn removed_target_leaves_the_queue() {
    let registry = Arc::new(MemoryBackend::new());
    let queue = Arc::new(MemoryQueue::new());
    let manager = TargetManager::new(registry.clone(), queue.clone());

    let keep = manager
        .add(new_target("https://keep.example.com", MonitoringFrequency::FiveMinutes))
        .await
        .unwrap();
    let gone = manager
        .add(new_target("https://drop.example.com", MonitoringFrequency::FiveMinutes))
        .await
        .unwrap();

    manager.remove(gone.id).await.unwrap();

    assert_eq!(
        queue.pending(MonitoringFrequency::FiveMinutes).await.unwrap(),
        vec![keep.id]
    );
    assert!(
        queue
            .snapshot(MonitoringFrequency::FiveMinutes, gone.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn prefill_covers_only_configured_frequencies() {
    let registry = MemoryBackend::new();
    let queue = MemoryQueue::new();
    registry
        .add(new_target("https://a.example.com", MonitoringFrequency::TenSeconds))
        .await
        .unwrap();
    registry
        .add(new_target("https://b.example.com", MonitoringFrequency::OneHour))
        .await
        .unwrap();

    refresh_all(&registry, &queue, &[MonitoringFrequency::TenSeconds])
        .await
        .unwrap();

    assert_eq!(queue.len(MonitoringFrequency::TenSeconds).await.unwrap(), 1);
    assert_eq!(queue.len(MonitoringFrequency::OneHour).await.unwrap(), 0);
}
