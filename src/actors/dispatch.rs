//! DispatchGroup - turns a tick into bounded units of probe work
//!
//! One dispatch group exists per monitoring frequency. It owns that frequency's probe worker
//! pool and the sending side of the pool's distribution queue.
//!
//! ## Message Flow
//!
//! ```text
//! Tick → LLEN → LRANGE → chunk ids → push chunks (blocks while the pool is saturated)
//!   ↑
//!   └─── DispatchHandle::signal (dropped while the previous tick is still running)
//! ```
//!
//! A full distribution queue stalls the group, which keeps its in-flight flag set, which makes
//! the scheduler drop further ticks for this frequency. That is the backpressure path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, trace, warn};

use super::messages::{DispatchCommand, ProbeOutcome, TickReport};
use super::probe::{ProbeContext, ProbePool, Prober};
use crate::config::ProbeConfig;
use crate::model::{MonitoringFrequency, TargetId};
use crate::queue::WorkQueue;

/// Split `ids` into contiguous chunks of at most `max` ids
///
/// Yields `ceil(ids.len() / max)` chunks; only the last one may be smaller than `max`.
pub fn chunk_ids(ids: &[TargetId], max: usize) -> Vec<Vec<TargetId>> {
    ids.chunks(max.max(1)).map(<[TargetId]>::to_vec).collect()
}

/// Flags shared between a dispatch group and its handles
#[derive(Debug, Default)]
struct GroupState {
    /// Set from the moment a tick is accepted until the group has pushed its last chunk
    in_flight: AtomicBool,
    ticks_dropped: AtomicU64,
    ticks_processed: AtomicU64,
}

/// Actor draining one frequency's queue into its worker pool
pub struct DispatchGroup {
    frequency: MonitoringFrequency,
    queue: Arc<dyn WorkQueue>,
    chunk_size: usize,
    chunk_tx: mpsc::Sender<Vec<TargetId>>,
    command_rx: mpsc::Receiver<DispatchCommand>,
    state: Arc<GroupState>,
    cancel: CancellationToken,
}

impl DispatchGroup {
    #[instrument(skip(self), fields(frequency = %self.frequency))]
    pub async fn run(mut self) {
        debug!("starting dispatch group");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("cancellation requested");
                    break;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DispatchCommand::Tick => {
                            if let Err(e) = self.dispatch().await {
                                warn!("tick abandoned: {e:#}");
                            }
                            self.state.ticks_processed.fetch_add(1, Ordering::Relaxed);
                            self.state.in_flight.store(false, Ordering::Release);
                        }

                        DispatchCommand::DispatchNow { respond_to } => {
                            trace!("received DispatchNow command");
                            let _ = respond_to.send(self.dispatch().await);
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("dispatch group stopped");
    }

    /// Drain the queue once and feed the worker pool
    ///
    /// Queue read errors abort before any chunk is pushed.
    async fn dispatch(&self) -> Result<TickReport> {
        let pending = self
            .queue
            .len(self.frequency)
            .await
            .context("failed to read queue length")?;

        if pending == 0 {
            trace!("nothing queued");
            return Ok(TickReport::default());
        }

        let ids = self
            .queue
            .pending(self.frequency)
            .await
            .context("failed to read pending ids")?;

        let chunks = chunk_ids(&ids, self.chunk_size);
        let mut report = TickReport {
            pending,
            chunk_sizes: Vec::with_capacity(chunks.len()),
        };

        for chunk in chunks {
            let size = chunk.len();
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("cancelled while pushing chunks");
                    break;
                }
                sent = self.chunk_tx.send(chunk) => {
                    sent.context("distribution queue closed")?;
                    report.chunk_sizes.push(size);
                }
            }
        }

        debug!(
            "dispatched {} ids in {} chunks",
            ids.len(),
            report.chunk_sizes.len()
        );
        Ok(report)
    }
}

/// Handle for signalling a DispatchGroup
///
/// Cheap to clone. Dropping every handle closes the group's command channel.
#[derive(Clone)]
pub struct DispatchHandle {
    frequency: MonitoringFrequency,
    sender: mpsc::Sender<DispatchCommand>,
    chunk_tx: mpsc::Sender<Vec<TargetId>>,
    state: Arc<GroupState>,
}

impl DispatchHandle {
    /// Spawn a dispatch group together with its probe worker pool
    ///
    /// Fails if `config.workers` is below one.
    pub fn spawn(
        frequency: MonitoringFrequency,
        config: &ProbeConfig,
        queue: Arc<dyn WorkQueue>,
        prober: Arc<dyn Prober>,
        outcome_tx: mpsc::Sender<ProbeOutcome>,
        cancel: CancellationToken,
        tracker: &TaskTracker,
    ) -> Result<Self> {
        let (chunk_tx, chunk_rx) = mpsc::channel(config.distribution_capacity.max(1));
        // a single slot: a second tick is never queued behind a running one
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        ProbePool::spawn(
            config.workers,
            chunk_rx,
            ProbeContext {
                frequency,
                queue: queue.clone(),
                prober,
                outcome_tx,
                cancel: cancel.clone(),
            },
            tracker,
        )?;

        let state = Arc::new(GroupState::default());
        let group = DispatchGroup {
            frequency,
            queue,
            chunk_size: config.chunk_size,
            chunk_tx: chunk_tx.clone(),
            command_rx: cmd_rx,
            state: state.clone(),
            cancel,
        };
        tracker.spawn(group.run());

        Ok(Self {
            frequency,
            sender: cmd_tx,
            chunk_tx,
            state,
        })
    }

    pub fn frequency(&self) -> MonitoringFrequency {
        self.frequency
    }

    /// Signal a tick without waiting
    ///
    /// Returns `false` if the group is still busy with an earlier tick; the tick is then
    /// dropped, not queued.
    pub fn signal(&self) -> bool {
        let accepted = self
            .state
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if accepted && self.sender.try_send(DispatchCommand::Tick).is_ok() {
            return true;
        }

        if accepted {
            self.state.in_flight.store(false, Ordering::Release);
        }
        self.state.ticks_dropped.fetch_add(1, Ordering::Relaxed);
        trace!("dropped tick for {}", self.frequency);
        false
    }

    /// Drain the queue now and wait for the report
    pub async fn dispatch_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatchCommand::DispatchNow { respond_to: tx })
            .await
            .context("failed to send DispatchNow command")?;

        rx.await.context("failed to receive response")?
    }

    /// Chunks waiting in the distribution queue
    pub fn queued_chunks(&self) -> usize {
        self.chunk_tx.max_capacity() - self.chunk_tx.capacity()
    }

    pub fn ticks_dropped(&self) -> u64 {
        self.state.ticks_dropped.load(Ordering::Relaxed)
    }

    pub fn ticks_processed(&self) -> u64 {
        self.state.ticks_processed.load(Ordering::Relaxed)
    }

    pub fn is_busy(&self) -> bool {
        self.state.in_flight.load(Ordering::Acquire)
    }
}
