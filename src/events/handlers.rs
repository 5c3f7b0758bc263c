//! Health state machine
//!
//! ```text
//! Pending   ── success ──► Healthy
//! Pending   ── failure ──► Unhealthy
//! Healthy   ── failure ──► Unhealthy   open incident, send "down"
//! Unhealthy ── success ──► Healthy     resolve incident, send "up"
//! ```
//!
//! Self-transitions only record a health sample.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, info, instrument};

use super::bus::{EventBus, EventHandler, EventKind, ProbeEvent};
use crate::model::{HealthSample, HealthStatus};
use crate::notify::{Notification, Notifier};
use crate::storage::{HealthSampleStore, IncidentStore, TargetRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentAction {
    Open,
    Resolve,
}

/// What a single observation does to a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: HealthStatus,

    /// Incident change; every incident change also sends a notification
    pub incident: Option<IncidentAction>,
}

impl Transition {
    pub fn changes_status(&self, previous: HealthStatus) -> bool {
        self.next != previous
    }
}

/// Apply one observation to the status recorded before it
///
/// A failure from `Pending` opens no incident: there is no healthy baseline to measure
/// downtime from.
pub fn transition(previous: HealthStatus, success: bool) -> Transition {
    match (previous, success) {
        (HealthStatus::Healthy, false) => Transition {
            next: HealthStatus::Unhealthy,
            incident: Some(IncidentAction::Open),
        },
        (HealthStatus::Unhealthy, true) => Transition {
            next: HealthStatus::Healthy,
            incident: Some(IncidentAction::Resolve),
        },
        (_, true) => Transition {
            next: HealthStatus::Healthy,
            incident: None,
        },
        (_, false) => Transition {
            next: HealthStatus::Unhealthy,
            incident: None,
        },
    }
}

/// Applies the state machine to every probe event
///
/// Steps run in order and the first failing one ends the handling of that event:
/// load target, incident change, notification, status update, health sample.
pub struct HealthTransitionHandler {
    registry: Arc<dyn TargetRegistry>,
    incidents: Arc<dyn IncidentStore>,
    samples: Arc<dyn HealthSampleStore>,
    notifier: Arc<dyn Notifier>,
}

impl HealthTransitionHandler {
    pub fn new(
        registry: Arc<dyn TargetRegistry>,
        incidents: Arc<dyn IncidentStore>,
        samples: Arc<dyn HealthSampleStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            registry,
            incidents,
            samples,
            notifier,
        }
    }

    /// Subscribe one shared handler to both probe event kinds
    pub fn subscribe(self: Arc<Self>, bus: &EventBus) {
        bus.subscribe(EventKind::ProbeSucceeded, self.clone());
        bus.subscribe(EventKind::ProbeFailed, self);
    }
}

#[async_trait]
impl EventHandler for HealthTransitionHandler {
    fn name(&self) -> &str {
        "health-transition"
    }

    #[instrument(skip_all, fields(target = event.target_id, kind = event.kind.as_str()))]
    async fn handle(&self, event: &ProbeEvent) -> anyhow::Result<()> {
        let target = self
            .registry
            .find_by_id(event.target_id)
            .await
            .context("failed to load target")?;

        let previous = target.status;
        let step = transition(previous, event.succeeded());

        if let Some(action) = step.incident {
            let notification = match action {
                IncidentAction::Open => {
                    self.incidents
                        .open(target.id, event.observed_at)
                        .await
                        .context("failed to open incident")?;
                    Notification::down(&target, event.observed_at)
                }
                IncidentAction::Resolve => {
                    self.incidents
                        .resolve(target.id, event.observed_at)
                        .await
                        .context("failed to resolve incident")?;
                    Notification::up(&target, event.observed_at)
                }
            };

            self.notifier
                .send(
                    std::slice::from_ref(&target.contact),
                    &notification.subject,
                    &notification.body,
                )
                .await
                .context("failed to send notification")?;

            info!("{} is now {}", target.address, step.next);
        }

        if step.changes_status(previous) {
            self.registry
                .update_status(target.id, step.next)
                .await
                .context("failed to update status")?;
            debug!("status {previous} -> {}", step.next);
        }

        self.samples
            .append(HealthSample {
                target_id: target.id,
                success: event.succeeded(),
                observed_at: event.observed_at,
            })
            .await
            .context("failed to record health sample")?;

        Ok(())
    }
}
