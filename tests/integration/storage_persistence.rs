//! Integration tests for SQLite persistence
//!
//! Data written through one backend must be visible after reopening the database file.

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use watchdog::analysis::analyze;
use watchdog::storage::sqlite::SqliteBackend;
use watchdog::storage::{HealthSampleStore, IncidentStore, TargetRegistry};
use watchdog::{HealthSample, HealthStatus, HttpMethod, MonitoringFrequency, TargetFilter};

use crate::helpers::new_target;

#[tokio::test]
async fn targets_survive_reopening() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("watchdog.db");

    let id = {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        let mut target = new_target("https://persist.example.com", MonitoringFrequency::OneHour);
        target.method = HttpMethod::Post;
        let id = backend.add(target).await.unwrap();
        backend
            .update_status(id, HealthStatus::Unhealthy)
            .await
            .unwrap();
        backend.close().await;
        id
    };

    let backend = SqliteBackend::new(&db_path).await.unwrap();
    let target = backend.find_by_id(id).await.unwrap();

    assert_eq!(target.address, "https://persist.example.com");
    assert_eq!(target.method, HttpMethod::Post);
    assert_eq!(target.frequency, MonitoringFrequency::OneHour);
    assert_eq!(target.status, HealthStatus::Unhealthy);

    let listed = backend
        .fetch_all(TargetFilter::frequency(MonitoringFrequency::OneHour), 10, 0)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn incidents_and_samples_feed_analysis_after_reopening() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("watchdog.db");
    let now = Utc::now();

    let id = {
        let backend = SqliteBackend::new(&db_path).await.unwrap();
        let id = backend
            .add(new_target("https://report.example.com", MonitoringFrequency::OneMinute))
            .await
            .unwrap();

        let down_at = now - Duration::hours(2);
        let up_at = now - Duration::hours(1);
        backend
            .append(HealthSample {
                target_id: id,
                success: false,
                observed_at: down_at,
            })
            .await
            .unwrap();
        backend.open(id, down_at).await.unwrap();
        backend.resolve(id, up_at).await.unwrap();
        backend
            .append(HealthSample {
                target_id: id,
                success: true,
                observed_at: up_at,
            })
            .await
            .unwrap();
        backend
            .update_status(id, HealthStatus::Healthy)
            .await
            .unwrap();
        backend.close().await;
        id
    };

    let backend = SqliteBackend::new(&db_path).await.unwrap();
    let report = analyze(&backend, &backend, &backend, id, now).await.unwrap();

    assert_eq!(report.target.status, HealthStatus::Healthy);
    assert_eq!(report.in_current_state.num_minutes(), 120);
    assert_eq!(report.since_last_check.map(|ago| ago.num_minutes()), Some(60));
    assert_eq!(report.incident_counts, vec![(1, 1), (7, 1), (30, 1), (365, 1)]);
}
