//! Wiring of the whole probe pipeline

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actors::aggregator::AggregatorHandle;
use crate::actors::probe::{HttpProber, Prober};
use crate::actors::scheduler::Scheduler;
use crate::config::Config;
use crate::events::{EventBus, HealthTransitionHandler};
use crate::notify::Notifier;
use crate::queue::{WorkQueue, refresh_all};
use crate::storage::Stores;

/// A running monitor
///
/// Owns the single cancellation token shared by every loop of the pipeline.
pub struct WatchdogRuntime {
    scheduler: Scheduler,
    aggregator: AggregatorHandle,
    aggregator_task: JoinHandle<()>,
    bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl WatchdogRuntime {
    /// Start the pipeline probing over HTTP
    pub async fn start(
        config: &Config,
        stores: Stores,
        queue: Arc<dyn WorkQueue>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let prober =
            HttpProber::new(config.probe.timeout()).context("failed to build HTTP client")?;
        Self::start_with_prober(config, stores, queue, notifier, Arc::new(prober)).await
    }

    /// Start the pipeline with a custom prober
    pub async fn start_with_prober(
        config: &Config,
        stores: Stores,
        queue: Arc<dyn WorkQueue>,
        notifier: Arc<dyn Notifier>,
        prober: Arc<dyn Prober>,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancellationToken::new();

        let bus = Arc::new(EventBus::with_backlog(
            config.event_bus.max_concurrent_handlers,
            config.event_bus.max_pending_handlers,
        ));
        Arc::new(HealthTransitionHandler::new(
            stores.registry.clone(),
            stores.incidents.clone(),
            stores.samples.clone(),
            notifier,
        ))
        .subscribe(&bus);

        refresh_all(stores.registry.as_ref(), queue.as_ref(), &config.frequencies)
            .await
            .context("failed to prefill pending-work queues")?;

        let (aggregator, aggregator_task) =
            AggregatorHandle::spawn(&config.aggregator, bus.clone(), cancel.clone());

        let scheduler = match Scheduler::start(
            &config.frequencies,
            &config.probe,
            queue,
            prober,
            aggregator.intake(),
            cancel.clone(),
        ) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                cancel.cancel();
                let _ = aggregator_task.await;
                return Err(e);
            }
        };

        info!("watchdog runtime started");
        Ok(Self {
            scheduler,
            aggregator,
            aggregator_task,
            bus,
            cancel,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn aggregator(&self) -> &AggregatorHandle {
        &self.aggregator
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel everything and wait for loops, workers, the aggregator and running handlers
    pub async fn shutdown(self) {
        info!("shutting down watchdog runtime");
        self.cancel.cancel();

        self.scheduler.shutdown().await;
        if let Err(e) = self.aggregator_task.await {
            warn!("aggregator task failed: {e}");
        }
        self.bus.shutdown().await;

        let stats = self.bus.stats();
        debug!(
            "event bus totals: {} dispatched, {} handled, {} failed, {} dropped",
            stats.dispatched, stats.handled, stats.failed, stats.dropped
        );
        info!("watchdog runtime stopped");
    }
}
