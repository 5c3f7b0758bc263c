//! Registry mutations that keep the pending-work queue in sync
//!
//! Every operation that changes which targets belong to a frequency refreshes that frequency's
//! queue afterwards. Health status is never written here.

use std::sync::Arc;

use reqwest::Url;
use tracing::{info, instrument};

use crate::model::{MonitoringFrequency, NewTarget, Target, TargetFilter, TargetId};
use crate::queue::{QueueError, WorkQueue, refresh_frequency};
use crate::storage::{StorageError, TargetRegistry};

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("invalid address {0:?}: expected an absolute http or https URL")]
    InvalidAddress(String),

    #[error("a contact address is required")]
    MissingContact,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub struct TargetManager {
    registry: Arc<dyn TargetRegistry>,
    queue: Arc<dyn WorkQueue>,
}

impl TargetManager {
    pub fn new(registry: Arc<dyn TargetRegistry>, queue: Arc<dyn WorkQueue>) -> Self {
        Self { registry, queue }
    }

    /// Validate and register a target, then requeue its frequency
    #[instrument(skip(self), fields(address = %target.address))]
    pub async fn add(&self, mut target: NewTarget) -> Result<Target, TargetError> {
        target.address = validate_address(&target.address)?;
        target.contact = target.contact.trim().to_string();
        if target.contact.is_empty() {
            return Err(TargetError::MissingContact);
        }

        let frequency = target.frequency;
        let id = self.registry.add(target).await?;
        self.refresh(frequency).await?;

        info!("added target {id} ({frequency})");
        Ok(self.registry.find_by_id(id).await?)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: TargetId) -> Result<Target, TargetError> {
        let target = self.registry.find_by_id(id).await?;
        self.registry.delete(id).await?;
        self.refresh(target.frequency).await?;

        info!("removed target {id} ({})", target.address);
        Ok(target)
    }

    /// Move a target to another frequency; both queues are rebuilt
    #[instrument(skip(self))]
    pub async fn change_frequency(
        &self,
        id: TargetId,
        frequency: MonitoringFrequency,
    ) -> Result<Target, TargetError> {
        let before = self.registry.find_by_id(id).await?;
        if before.frequency == frequency {
            return Ok(before);
        }

        self.registry.update_frequency(id, frequency).await?;
        self.refresh(before.frequency).await?;
        self.refresh(frequency).await?;

        info!("moved target {id} from {} to {frequency}", before.frequency);
        Ok(self.registry.find_by_id(id).await?)
    }

    pub async fn list(
        &self,
        filter: TargetFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Target>, TargetError> {
        Ok(self.registry.fetch_all(filter, limit, offset).await?)
    }

    pub async fn get(&self, id: TargetId) -> Result<Target, TargetError> {
        Ok(self.registry.find_by_id(id).await?)
    }

    async fn refresh(&self, frequency: MonitoringFrequency) -> Result<usize, TargetError> {
        Ok(refresh_frequency(self.registry.as_ref(), self.queue.as_ref(), frequency).await?)
    }
}

/// Normalized form of `address`, or an error unless it is an absolute http(s) URL
pub fn validate_address(address: &str) -> Result<String, TargetError> {
    let trimmed = address.trim();
    let url =
        Url::parse(trimmed).map_err(|_| TargetError::InvalidAddress(address.to_string()))?;

    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(trimmed.to_string()),
        _ => Err(TargetError::InvalidAddress(address.to_string())),
    }
}
