//! Pending-work queue
//!
//! For every monitoring frequency the queue holds an ordered list of target ids and a snapshot
//! map (`id -> serialized Target`), so probe workers never have to query the registry on a tick.
//!
//! The queue is derived state. It is rebuilt from the registry with [`refresh_frequency`]
//! whenever a registry mutation changes which targets belong to a frequency.
//!
//! ```text
//! watchdog:pending:{secs}    LIST  [id, id, id, ...]      (ascending id order)
//! watchdog:snapshots:{secs}  HASH  { id => Target JSON }
//! ```

pub mod memory;
#[cfg(feature = "queue-redis")]
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

pub use memory::MemoryQueue;

use crate::config::QueueConfig;
use crate::model::{MonitoringFrequency, Target, TargetFilter, TargetId};
use crate::storage::{StorageError, TargetRegistry};

/// Page size used when reading a frequency's members from the registry
const REFRESH_PAGE_SIZE: usize = 500;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[cfg(feature = "queue-redis")]
    #[error("redis command failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("failed to encode or decode target snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("failed to read targets from registry: {0}")]
    Registry(#[from] StorageError),
}

/// Key of the pending id list for `frequency`
pub fn pending_key(frequency: MonitoringFrequency) -> String {
    format!("watchdog:pending:{}", frequency.as_secs())
}

/// Key of the snapshot map for `frequency`
pub fn snapshot_key(frequency: MonitoringFrequency) -> String {
    format!("watchdog:snapshots:{}", frequency.as_secs())
}

/// Shared store of pending target ids and their cached snapshots
///
/// Reads are non-destructive: draining a frequency's list for a tick leaves membership intact
/// for the next tick.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Number of pending ids for `frequency`
    async fn len(&self, frequency: MonitoringFrequency) -> QueueResult<usize>;

    /// All pending ids for `frequency`, in list order
    async fn pending(&self, frequency: MonitoringFrequency) -> QueueResult<Vec<TargetId>>;

    /// Cached snapshot of one target, `None` if it is not (or no longer) queued
    async fn snapshot(
        &self,
        frequency: MonitoringFrequency,
        id: TargetId,
    ) -> QueueResult<Option<Target>>;

    /// Atomically replace both the id list and the snapshot map of `frequency`
    ///
    /// A concurrent reader sees either the old membership or the new one, never a mix.
    async fn replace(&self, frequency: MonitoringFrequency, targets: &[Target]) -> QueueResult<()>;
}

/// Rebuild the queue of one frequency from the registry
///
/// Returns the number of targets now queued. Running it twice without registry changes in
/// between leaves an identical list and snapshot map.
#[instrument(skip(registry, queue))]
pub async fn refresh_frequency(
    registry: &dyn TargetRegistry,
    queue: &dyn WorkQueue,
    frequency: MonitoringFrequency,
) -> QueueResult<usize> {
    let filter = TargetFilter::frequency(frequency);
    let mut members = Vec::new();

    loop {
        let page = registry
            .fetch_all(filter, REFRESH_PAGE_SIZE, members.len())
            .await?;
        let last_page = page.len() < REFRESH_PAGE_SIZE;
        members.extend(page);
        if last_page {
            break;
        }
    }

    members.sort_by_key(|target| target.id);
    queue.replace(frequency, &members).await?;

    debug!("queued {} targets for {frequency}", members.len());
    Ok(members.len())
}

/// Rebuild the queues of every given frequency (startup prefill)
pub async fn refresh_all(
    registry: &dyn TargetRegistry,
    queue: &dyn WorkQueue,
    frequencies: &[MonitoringFrequency],
) -> QueueResult<()> {
    for frequency in frequencies {
        refresh_frequency(registry, queue, *frequency).await?;
    }
    Ok(())
}

/// Open the configured queue backend
pub async fn connect(config: &QueueConfig) -> QueueResult<Arc<dyn WorkQueue>> {
    match config {
        QueueConfig::Memory => Ok(Arc::new(MemoryQueue::new())),
        #[cfg(feature = "queue-redis")]
        QueueConfig::Redis { url } => Ok(Arc::new(redis::RedisQueue::new(url).await?)),
        #[cfg(not(feature = "queue-redis"))]
        QueueConfig::Redis { .. } => Err(QueueError::Unavailable(
            "built without the queue-redis feature".to_string(),
        )),
    }
}
