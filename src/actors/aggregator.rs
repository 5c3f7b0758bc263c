//! ResultAggregator - batches probe outcomes into domain events
//!
//! ## Batching Strategy
//!
//! Outcomes are buffered and flushed to the event bus on either trigger:
//! - **Size trigger**: the buffer reaches `batch_size`
//! - **Time trigger**: `flush_interval` elapsed and the buffer is not empty
//!
//! Flushes never overlap since only the actor loop touches the buffer. A flush hands events to
//! the bus and returns; it does not wait for handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use super::messages::{AggregatorCommand, AggregatorStats, ProbeOutcome};
use crate::config::AggregatorConfig;
use crate::events::{EventBus, EventKind, ProbeEvent};

/// Shortest flush interval the aggregator will run with
const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

pub struct ResultAggregator {
    buffer: Vec<ProbeOutcome>,
    batch_size: usize,
    flush_interval: Duration,
    intake_rx: mpsc::Receiver<ProbeOutcome>,
    command_rx: mpsc::Receiver<AggregatorCommand>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
    stats: AggregatorStats,
}

impl ResultAggregator {
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting result aggregator (batch size {}, flush every {:?})",
            self.batch_size, self.flush_interval
        );

        let mut flush_interval =
            time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }

                Some(outcome) = self.intake_rx.recv() => {
                    self.stats.received += 1;
                    self.buffer.push(outcome);

                    if self.buffer.len() >= self.batch_size {
                        trace!("size-based flush triggered ({} outcomes)", self.buffer.len());
                        self.flush();
                    }
                }

                _ = flush_interval.tick() => {
                    if !self.buffer.is_empty() {
                        trace!("time-based flush triggered ({} outcomes)", self.buffer.len());
                        self.flush();
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    self.handle_command(cmd);
                }
            }
        }

        if !self.buffer.is_empty() {
            debug!(
                "final flush before shutdown ({} outcomes)",
                self.buffer.len()
            );
            self.flush();
        }

        debug!("result aggregator stopped");
    }

    /// Turn every buffered outcome into an event and clear the buffer
    fn flush(&mut self) -> usize {
        let count = self.buffer.len();
        if count == 0 {
            return 0;
        }

        for outcome in self.buffer.drain(..) {
            self.bus.dispatch(ProbeEvent {
                kind: EventKind::from_success(outcome.success),
                target_id: outcome.target_id,
                address: outcome.address,
                observed_at: outcome.observed_at,
            });
        }

        self.stats.flushes += 1;
        self.stats.events_dispatched += count as u64;
        trace!("flush #{} complete ({count} events)", self.stats.flushes);
        count
    }

    fn handle_command(&mut self, cmd: AggregatorCommand) {
        match cmd {
            AggregatorCommand::Flush { respond_to } => {
                debug!("manual flush requested");
                let _ = respond_to.send(self.flush());
            }

            AggregatorCommand::GetStats { respond_to } => {
                let stats = AggregatorStats {
                    buffered: self.buffer.len(),
                    ..self.stats.clone()
                };
                let _ = respond_to.send(stats);
            }
        }
    }
}

/// Handle for controlling the ResultAggregator
#[derive(Clone)]
pub struct AggregatorHandle {
    sender: mpsc::Sender<AggregatorCommand>,
    intake: mpsc::Sender<ProbeOutcome>,
}

impl AggregatorHandle {
    /// Spawn the aggregator; its intake holds at most one batch of outcomes
    pub fn spawn(
        config: &AggregatorConfig,
        bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let batch_size = config.batch_size.max(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (intake_tx, intake_rx) = mpsc::channel(batch_size);

        let actor = ResultAggregator {
            buffer: Vec::with_capacity(batch_size),
            batch_size,
            flush_interval: config.flush_interval().max(MIN_FLUSH_INTERVAL),
            intake_rx,
            command_rx: cmd_rx,
            bus,
            cancel,
            stats: AggregatorStats::default(),
        };

        let join = tokio::spawn(actor.run());

        (
            Self {
                sender: cmd_tx,
                intake: intake_tx,
            },
            join,
        )
    }

    /// Sender probe workers push outcomes into
    pub fn intake(&self) -> mpsc::Sender<ProbeOutcome> {
        self.intake.clone()
    }

    /// Flush right away, returning the number of events dispatched
    pub async fn flush(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregatorCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn stats(&self) -> Result<AggregatorStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AggregatorCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }
}
