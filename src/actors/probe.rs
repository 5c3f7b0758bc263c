//! Probe worker pool
//!
//! A fixed number of workers per frequency share one bounded distribution queue of id chunks.
//! Each worker takes a whole chunk and probes its targets one after another; parallelism comes
//! only from running several workers.
//!
//! ## Message Flow
//!
//! ```text
//! distribution queue ─┬─► worker-0 ─┐
//!                     ├─► worker-1 ─┼─► aggregator intake
//!                     └─► worker-N ─┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, trace, warn};

use super::messages::ProbeOutcome;
use crate::model::{MonitoringFrequency, Target, TargetId};
use crate::queue::WorkQueue;

/// Performs one health check against a target
#[async_trait]
pub trait Prober: Send + Sync {
    /// `true` iff the target is healthy
    async fn probe(&self, target: &Target) -> bool;
}

/// Probes over HTTP with the target's method and no body
///
/// Healthy iff the response status is in 200..=299. Timeouts, refused connections and DNS
/// failures are reported exactly like a non-2xx response.
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &Target) -> bool {
        let request = self
            .client
            .request(target.method.into(), target.address.as_str());

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                trace!("{} {} -> {status}", target.method, target.address);
                status.is_success()
            }
            Err(e) => {
                debug!("{} {} failed: {e}", target.method, target.address);
                false
            }
        }
    }
}

/// Receiving end of a frequency's distribution queue, shared by its workers
pub type ChunkReceiver = Arc<Mutex<mpsc::Receiver<Vec<TargetId>>>>;

/// Everything a probe worker needs, cloned once per worker
#[derive(Clone)]
pub struct ProbeContext {
    pub frequency: MonitoringFrequency,
    pub queue: Arc<dyn WorkQueue>,
    pub prober: Arc<dyn Prober>,
    pub outcome_tx: mpsc::Sender<ProbeOutcome>,
    pub cancel: CancellationToken,
}

/// Worker pool of a single frequency
pub struct ProbePool;

impl ProbePool {
    /// Spawn `workers` probe workers on `tracker`
    ///
    /// A worker count below one is a startup error.
    pub fn spawn(
        workers: usize,
        chunks: mpsc::Receiver<Vec<TargetId>>,
        context: ProbeContext,
        tracker: &TaskTracker,
    ) -> Result<()> {
        if workers < 1 {
            anyhow::bail!(
                "probe worker count for {} must be at least 1 (got {workers})",
                context.frequency
            );
        }

        let chunks: ChunkReceiver = Arc::new(Mutex::new(chunks));
        for index in 0..workers {
            let worker = ProbeWorker {
                index,
                chunks: chunks.clone(),
                context: context.clone(),
            };
            tracker.spawn(worker.run());
        }

        debug!("spawned {workers} probe workers for {}", context.frequency);
        Ok(())
    }
}

struct ProbeWorker {
    index: usize,
    chunks: ChunkReceiver,
    context: ProbeContext,
}

impl ProbeWorker {
    #[instrument(skip(self), fields(frequency = %self.context.frequency, worker = self.index))]
    async fn run(self) {
        trace!("starting probe worker");

        loop {
            let chunk = tokio::select! {
                _ = self.context.cancel.cancelled() => break,
                chunk = Self::next_chunk(&self.chunks) => chunk,
            };

            let Some(chunk) = chunk else {
                debug!("distribution queue closed");
                break;
            };

            if !self.process_chunk(chunk).await {
                break;
            }
        }

        trace!("probe worker stopped");
    }

    async fn next_chunk(chunks: &ChunkReceiver) -> Option<Vec<TargetId>> {
        chunks.lock().await.recv().await
    }

    /// Probe every id of a chunk in order; `false` once cancelled or the aggregator is gone
    async fn process_chunk(&self, chunk: Vec<TargetId>) -> bool {
        trace!("processing chunk of {} ids", chunk.len());
        let frequency = self.context.frequency;

        for id in chunk {
            if self.context.cancel.is_cancelled() {
                debug!("cancelled mid-chunk, skipping target {id} and the rest of the chunk");
                return false;
            }

            let target = match self.context.queue.snapshot(frequency, id).await {
                Ok(Some(target)) => target,
                Ok(None) => {
                    warn!("no snapshot for target {id}, skipping");
                    continue;
                }
                Err(e) => {
                    warn!("failed to read snapshot for target {id}: {e}");
                    continue;
                }
            };

            let success = self.context.prober.probe(&target).await;
            let outcome = ProbeOutcome {
                target_id: target.id,
                address: target.address,
                frequency,
                success,
                observed_at: Utc::now(),
            };

            if self.context.outcome_tx.send(outcome).await.is_err() {
                debug!("aggregator intake closed, discarding outcome for target {id}");
                return false;
            }
        }

        true
    }
}
