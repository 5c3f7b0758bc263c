//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the monitor with `"storage": { "backend": "none" }`
//!
//! All data is lost on restart.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::backend::{HealthSampleStore, IncidentStore, TargetRegistry};
use super::error::{StorageError, StorageResult};
use crate::model::{
    HealthSample, HealthStatus, Incident, MonitoringFrequency, NewTarget, Target, TargetFilter,
    TargetId, WindowUnit,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: TargetId,
    targets: BTreeMap<TargetId, Target>,
    incidents: Vec<Incident>,
    samples: Vec<HealthSample>,
}

/// In-memory backend implementing every storage trait
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<Tables>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> StorageResult<R> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StorageError::QueryFailed("memory backend lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> StorageResult<R> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StorageError::QueryFailed("memory backend lock poisoned".to_string()))?;
        Ok(f(&mut tables))
    }

    /// All incidents recorded for a target, oldest first
    pub fn incidents(&self, target_id: TargetId) -> StorageResult<Vec<Incident>> {
        self.read(|tables| {
            tables
                .incidents
                .iter()
                .filter(|incident| incident.target_id == target_id)
                .cloned()
                .collect()
        })
    }

    /// All samples recorded for a target, oldest first
    pub fn samples(&self, target_id: TargetId) -> StorageResult<Vec<HealthSample>> {
        self.read(|tables| {
            tables
                .samples
                .iter()
                .filter(|sample| sample.target_id == target_id)
                .cloned()
                .collect()
        })
    }
}

#[async_trait]
impl TargetRegistry for MemoryBackend {
    async fn find_by_id(&self, id: TargetId) -> StorageResult<Target> {
        self.read(|tables| tables.targets.get(&id).cloned())?
            .ok_or(StorageError::NotFound(id))
    }

    async fn fetch_all(
        &self,
        filter: TargetFilter,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<Target>> {
        self.read(|tables| {
            tables
                .targets
                .values()
                .filter(|target| filter.matches(target))
                .skip(offset)
                .take(limit)
                .cloned()
                .collect()
        })
    }

    async fn add(&self, target: NewTarget) -> StorageResult<TargetId> {
        let now = Utc::now();
        self.write(|tables| {
            tables.next_id += 1;
            let id = tables.next_id;
            tables.targets.insert(
                id,
                Target {
                    id,
                    address: target.address,
                    method: target.method,
                    frequency: target.frequency,
                    contact: target.contact,
                    status: HealthStatus::Pending,
                    created_at: now,
                    updated_at: now,
                },
            );
            debug!("registered target {id} in memory");
            id
        })
    }

    async fn delete(&self, id: TargetId) -> StorageResult<()> {
        self.write(|tables| tables.targets.remove(&id))?
            .map(|_| ())
            .ok_or(StorageError::NotFound(id))
    }

    async fn update_status(&self, id: TargetId, status: HealthStatus) -> StorageResult<()> {
        self.write(|tables| {
            tables.targets.get_mut(&id).map(|target| {
                target.status = status;
                target.updated_at = Utc::now();
            })
        })?
        .ok_or(StorageError::NotFound(id))
    }

    async fn update_frequency(
        &self,
        id: TargetId,
        frequency: MonitoringFrequency,
    ) -> StorageResult<()> {
        self.write(|tables| {
            tables.targets.get_mut(&id).map(|target| {
                target.frequency = frequency;
                target.updated_at = Utc::now();
            })
        })?
        .ok_or(StorageError::NotFound(id))
    }
}

#[async_trait]
impl IncidentStore for MemoryBackend {
    async fn open(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()> {
        self.write(|tables| {
            let already_open = tables
                .incidents
                .iter()
                .any(|incident| incident.target_id == target_id && incident.is_open());
            if !already_open {
                tables.incidents.push(Incident {
                    target_id,
                    opened_at: at,
                    resolved_at: None,
                });
            }
        })
    }

    async fn resolve(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()> {
        self.write(|tables| {
            tables
                .incidents
                .iter_mut()
                .filter(|incident| incident.target_id == target_id && incident.is_open())
                .for_each(|incident| incident.resolved_at = Some(at));
        })
    }

    async fn count_in_window(
        &self,
        target_id: TargetId,
        amount: u32,
        unit: WindowUnit,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let since = now - unit.span(amount);
        self.read(|tables| {
            tables
                .incidents
                .iter()
                .filter(|incident| incident.target_id == target_id && incident.opened_at >= since)
                .count() as u64
        })
    }

    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<Incident>> {
        self.read(|tables| {
            tables
                .incidents
                .iter()
                .rev()
                .find(|incident| incident.target_id == target_id)
                .cloned()
        })
    }
}

#[async_trait]
impl HealthSampleStore for MemoryBackend {
    async fn append(&self, sample: HealthSample) -> StorageResult<()> {
        self.write(|tables| tables.samples.push(sample))
    }

    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<HealthSample>> {
        self.read(|tables| {
            tables
                .samples
                .iter()
                .rev()
                .find(|sample| sample.target_id == target_id)
                .cloned()
        })
    }

    async fn latest_with_outcome(
        &self,
        target_id: TargetId,
        success: bool,
    ) -> StorageResult<Option<HealthSample>> {
        self.read(|tables| {
            tables
                .samples
                .iter()
                .rev()
                .find(|sample| sample.target_id == target_id && sample.success == success)
                .cloned()
        })
    }
}
