//! Health transitions applied through the event handler against in-memory storage

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use watchdog::events::{EventHandler, EventKind, HealthTransitionHandler, ProbeEvent};
use watchdog::notify::{Notifier, NotifyError};
use watchdog::storage::{MemoryBackend, TargetRegistry};
use watchdog::{HealthStatus, MonitoringFrequency, TargetId};

use crate::helpers::*;

struct Fixture {
    backend: Arc<MemoryBackend>,
    notifier: Arc<RecordingNotifier>,
    handler: HealthTransitionHandler,
    id: TargetId,
}

async fn fixture() -> Fixture {
    let backend = Arc::new(MemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let id = backend
        .add(new_target("https://shop.example.com", MonitoringFrequency::OneMinute))
        .await
        .unwrap();

    let handler = HealthTransitionHandler::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        notifier.clone(),
    );

    Fixture {
        backend,
        notifier,
        handler,
        id,
    }
}

fn event(id: TargetId, success: bool, seconds: i64) -> ProbeEvent {
    ProbeEvent {
        kind: EventKind::from_success(success),
        target_id: id,
        address: "https://shop.example.com".to_string(),
        observed_at: Utc::now() + Duration::seconds(seconds),
    }
}

async fn replay(fixture: &Fixture, outcomes: &[bool]) {
    for (i, &success) in outcomes.iter().enumerate() {
        fixture
            .handler
            .handle(&event(fixture.id, success, i as i64))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn first_failure_marks_unhealthy_without_incident() {
    let fixture = fixture().await;
    replay(&fixture, &[false]).await;

    let target = fixture.backend.find_by_id(fixture.id).await.unwrap();
    assert_eq!(target.status, HealthStatus::Unhealthy);
    assert!(fixture.backend.incidents(fixture.id).unwrap().is_empty());
    assert!(fixture.notifier.subjects().is_empty());
}

#[tokio::test]
async fn healthy_then_failed_opens_incident() {
    let fixture = fixture().await;
    replay(&fixture, &[true, false]).await;

    let target = fixture.backend.find_by_id(fixture.id).await.unwrap();
    assert_eq!(target.status, HealthStatus::Unhealthy);

    let incidents = fixture.backend.incidents(fixture.id).unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(incidents[0].is_open());

    assert_eq!(fixture.notifier.subjects(), vec!["Your site is DOWN"]);
    assert_eq!(
        fixture.notifier.recipients(),
        vec![vec!["ops@example.com".to_string()]]
    );
}

#[tokio::test]
async fn recovery_resolves_incident_and_notifies_once_each_way() {
    let fixture = fixture().await;
    replay(&fixture, &[true, false, false, true, true]).await;

    let target = fixture.backend.find_by_id(fixture.id).await.unwrap();
    assert_eq!(target.status, HealthStatus::Healthy);

    let incidents = fixture.backend.incidents(fixture.id).unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(!incidents[0].is_open());
    assert!(incidents[0].resolved_at.unwrap() > incidents[0].opened_at);

    assert_eq!(
        fixture.notifier.subjects(),
        vec!["Your site is DOWN", "Your site is UP again"]
    );
}

#[tokio::test]
async fn every_event_records_a_sample() {
    let fixture = fixture().await;
    let outcomes = [true, true, false, true];
    replay(&fixture, &outcomes).await;

    let samples = fixture.backend.samples(fixture.id).unwrap();
    let recorded: Vec<bool> = samples.iter().map(|sample| sample.success).collect();
    assert_eq!(recorded, outcomes.to_vec());
}

#[tokio::test]
async fn unknown_target_is_an_error() {
    let fixture = fixture().await;
    let result = fixture.handler.handle(&event(fixture.id + 100, true, 0)).await;

    assert!(result.is_err());
    assert!(fixture.backend.samples(fixture.id).unwrap().is_empty());
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(
        &self,
        _recipients: &[String],
        _subject: &str,
        _body: &str,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(reqwest::StatusCode::BAD_GATEWAY))
    }
}

#[tokio::test]
async fn failed_notification_stops_the_transition() {
    let backend = Arc::new(MemoryBackend::new());
    let id = backend
        .add(new_target("https://shop.example.com", MonitoringFrequency::OneMinute))
        .await
        .unwrap();
    backend.update_status(id, HealthStatus::Healthy).await.unwrap();

    let handler = HealthTransitionHandler::new(
        backend.clone(),
        backend.clone(),
        backend.clone(),
        Arc::new(FailingNotifier),
    );

    let result = handler.handle(&event(id, false, 0)).await;
    assert!(result.is_err());

    // incident opened before the notifier failed, nothing after it ran
    assert_eq!(
        backend.find_by_id(id).await.unwrap().status,
        HealthStatus::Healthy
    );
    assert_eq!(backend.incidents(id).unwrap().len(), 1);
    assert!(backend.samples(id).unwrap().is_empty());
}
