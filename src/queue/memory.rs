//! Process-local pending-work queue
//!
//! Each frequency's list and snapshot map live under a single lock, so `replace` is atomic
//! with respect to readers.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{QueueError, QueueResult, WorkQueue};
use crate::model::{MonitoringFrequency, Target, TargetId};

#[derive(Debug, Default, Clone, PartialEq)]
struct FrequencyQueue {
    pending: Vec<TargetId>,
    snapshots: HashMap<TargetId, String>,
}

#[derive(Debug, Default)]
pub struct MemoryQueue {
    queues: RwLock<HashMap<MonitoringFrequency, FrequencyQueue>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(
        &self,
        frequency: MonitoringFrequency,
        f: impl FnOnce(Option<&FrequencyQueue>) -> R,
    ) -> QueueResult<R> {
        let queues = self
            .queues
            .read()
            .map_err(|_| QueueError::Unavailable("memory queue lock poisoned".to_string()))?;
        Ok(f(queues.get(&frequency)))
    }

    /// Raw snapshot map of a frequency, for comparing queue states
    pub fn snapshot_map(
        &self,
        frequency: MonitoringFrequency,
    ) -> QueueResult<HashMap<TargetId, String>> {
        self.read(frequency, |queue| {
            queue.map(|q| q.snapshots.clone()).unwrap_or_default()
        })
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn len(&self, frequency: MonitoringFrequency) -> QueueResult<usize> {
        self.read(frequency, |queue| queue.map_or(0, |q| q.pending.len()))
    }

    async fn pending(&self, frequency: MonitoringFrequency) -> QueueResult<Vec<TargetId>> {
        self.read(frequency, |queue| {
            queue.map(|q| q.pending.clone()).unwrap_or_default()
        })
    }

    async fn snapshot(
        &self,
        frequency: MonitoringFrequency,
        id: TargetId,
    ) -> QueueResult<Option<Target>> {
        let raw = self.read(frequency, |queue| {
            queue.and_then(|q| q.snapshots.get(&id).cloned())
        })?;

        raw.map(|json| serde_json::from_str(&json).map_err(QueueError::from))
            .transpose()
    }

    async fn replace(&self, frequency: MonitoringFrequency, targets: &[Target]) -> QueueResult<()> {
        // encode outside the lock so a bad snapshot leaves the old state untouched
        let mut rebuilt = FrequencyQueue::default();
        for target in targets {
            rebuilt.pending.push(target.id);
            rebuilt
                .snapshots
                .insert(target.id, serde_json::to_string(target)?);
        }

        let mut queues = self
            .queues
            .write()
            .map_err(|_| QueueError::Unavailable("memory queue lock poisoned".to_string()))?;
        queues.insert(frequency, rebuilt);
        Ok(())
    }
}
