//! Storage traits consumed by the monitor
//!
//! The monitor only ever talks to these traits. Concurrency control is delegated entirely
//! to the implementation; callers perform no additional locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use crate::model::{
    HealthSample, HealthStatus, Incident, MonitoringFrequency, NewTarget, Target, TargetFilter,
    TargetId, WindowUnit,
};

/// Persistent store of monitored targets
#[async_trait]
pub trait TargetRegistry: Send + Sync {
    /// Look up a single target
    ///
    /// Returns `StorageError::NotFound` if no target has this id.
    async fn find_by_id(&self, id: TargetId) -> StorageResult<Target>;

    /// List targets matching `filter`, ordered by id
    async fn fetch_all(
        &self,
        filter: TargetFilter,
        limit: usize,
        offset: usize,
    ) -> StorageResult<Vec<Target>>;

    /// Register a new target with status `Pending`
    async fn add(&self, target: NewTarget) -> StorageResult<TargetId>;

    async fn delete(&self, id: TargetId) -> StorageResult<()>;

    async fn update_status(&self, id: TargetId, status: HealthStatus) -> StorageResult<()>;

    async fn update_frequency(
        &self,
        id: TargetId,
        frequency: MonitoringFrequency,
    ) -> StorageResult<()>;
}

/// Downtime incident log
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// Open an incident for `target_id`
    ///
    /// A target has at most one open incident; opening while one is already open is a no-op.
    async fn open(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()>;

    /// Resolve the open incident of `target_id`, if any
    async fn resolve(&self, target_id: TargetId, at: DateTime<Utc>) -> StorageResult<()>;

    /// Number of incidents opened within the last `amount` `unit`s before `now`
    async fn count_in_window(
        &self,
        target_id: TargetId,
        amount: u32,
        unit: WindowUnit,
        now: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Most recently opened incident
    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<Incident>>;
}

/// Append-only time series of probe observations
#[async_trait]
pub trait HealthSampleStore: Send + Sync {
    async fn append(&self, sample: HealthSample) -> StorageResult<()>;

    async fn latest(&self, target_id: TargetId) -> StorageResult<Option<HealthSample>>;

    /// Most recent sample whose outcome equals `success`
    async fn latest_with_outcome(
        &self,
        target_id: TargetId,
        success: bool,
    ) -> StorageResult<Option<HealthSample>>;
}
