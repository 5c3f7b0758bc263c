//! Scheduler - one ticking loop per distinct monitoring frequency
//!
//! The frequency → dispatch group table is built once in [`Scheduler::start`] and owned by the
//! scheduler afterwards; nothing mutates it at runtime. Every loop, group and worker runs on
//! the scheduler's task tracker, so [`Scheduler::shutdown`] can wait for all of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, trace};

use super::dispatch::DispatchHandle;
use super::messages::ProbeOutcome;
use super::probe::Prober;
use crate::config::ProbeConfig;
use crate::model::MonitoringFrequency;
use crate::queue::WorkQueue;

pub struct Scheduler {
    groups: BTreeMap<MonitoringFrequency, DispatchHandle>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    /// Create one dispatch group per distinct frequency and start ticking
    ///
    /// Duplicate frequencies collapse into one group. The first tick of every loop fires one
    /// full period after startup.
    pub fn start(
        frequencies: &[MonitoringFrequency],
        config: &ProbeConfig,
        queue: Arc<dyn WorkQueue>,
        prober: Arc<dyn Prober>,
        outcome_tx: mpsc::Sender<ProbeOutcome>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let tracker = TaskTracker::new();
        let mut groups = BTreeMap::new();

        for &frequency in frequencies {
            if groups.contains_key(&frequency) {
                trace!("ignoring duplicate frequency {frequency}");
                continue;
            }

            let handle = DispatchHandle::spawn(
                frequency,
                config,
                queue.clone(),
                prober.clone(),
                outcome_tx.clone(),
                cancel.clone(),
                &tracker,
            );

            let handle = match handle {
                Ok(handle) => handle,
                Err(e) => {
                    cancel.cancel();
                    return Err(e);
                }
            };
            groups.insert(frequency, handle);
        }

        for handle in groups.values() {
            tracker.spawn(tick_loop(handle.clone(), cancel.clone()));
        }

        info!(
            "scheduler started with {} frequencies: {:?}",
            groups.len(),
            groups.keys().map(|f| f.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            groups,
            cancel,
            tracker,
        })
    }

    pub fn frequencies(&self) -> impl Iterator<Item = MonitoringFrequency> + '_ {
        self.groups.keys().copied()
    }

    pub fn group(&self, frequency: MonitoringFrequency) -> Option<&DispatchHandle> {
        self.groups.get(&frequency)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Cancel every loop and wait until all of them, their groups and workers have exited
    pub async fn shutdown(self) {
        debug!("stopping scheduler");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("scheduler stopped");
    }
}

#[instrument(skip_all, fields(frequency = %handle.frequency()))]
async fn tick_loop(handle: DispatchHandle, cancel: CancellationToken) {
    let period = handle.frequency().as_duration();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if !handle.signal() {
                    debug!("dispatch group busy, tick dropped");
                }
            }
        }
    }

    trace!("tick loop stopped");
}
