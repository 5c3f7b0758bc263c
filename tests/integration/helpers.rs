//! Helper functions for integration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use watchdog::actors::probe::Prober;
use watchdog::config::{AggregatorConfig, Config, ProbeConfig};
use watchdog::events::{EventHandler, ProbeEvent};
use watchdog::notify::{Notifier, NotifyError};
use watchdog::{HealthStatus, HttpMethod, MonitoringFrequency, NewTarget, Target, TargetId};

pub fn new_target(address: &str, frequency: MonitoringFrequency) -> NewTarget {
    NewTarget {
        address: address.to_string(),
        method: HttpMethod::Get,
        frequency,
        contact: "ops@example.com".to_string(),
    }
}

/// A snapshot as the queue would hold it
pub fn snapshot(id: TargetId, address: &str, method: HttpMethod) -> Target {
    let now = Utc::now();
    Target {
        id,
        address: address.to_string(),
        method,
        frequency: MonitoringFrequency::TenSeconds,
        contact: "ops@example.com".to_string(),
        status: HealthStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

pub fn test_config(
    frequencies: Vec<MonitoringFrequency>,
    workers: usize,
    chunk_size: usize,
) -> Config {
    Config {
        frequencies,
        probe: ProbeConfig {
            workers,
            chunk_size,
            ..ProbeConfig::default()
        },
        aggregator: AggregatorConfig {
            batch_size: 100,
            flush_interval_secs: 1,
        },
        ..Config::default()
    }
}

/// Prober answering from a fixed table; unknown addresses are healthy
#[derive(Default)]
pub struct StubProber {
    outcomes: Mutex<HashMap<String, bool>>,
    calls: AtomicUsize,
}

impl StubProber {
    pub fn set(&self, address: &str, healthy: bool) {
        self.outcomes
            .lock()
            .unwrap()
            .insert(address.to_string(), healthy);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self, target: &Target) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .get(&target.address)
            .copied()
            .unwrap_or(true)
    }
}

/// Notifier that keeps every message it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Vec<String>, String)>>,
}

impl RecordingNotifier {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, subject)| subject.clone())
            .collect()
    }

    pub fn recipients(&self) -> Vec<Vec<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(recipients, _)| recipients.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        recipients: &[String],
        subject: &str,
        _body: &str,
    ) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipients.to_vec(), subject.to_string()));
        Ok(())
    }
}

/// Event handler that only counts deliveries
#[derive(Default)]
pub struct CountingHandler {
    events: Mutex<Vec<ProbeEvent>>,
}

impl CountingHandler {
    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn events(&self) -> Vec<ProbeEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for CountingHandler {
    fn name(&self) -> &str {
        "counting"
    }

    async fn handle(&self, event: &ProbeEvent) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition().await
}
