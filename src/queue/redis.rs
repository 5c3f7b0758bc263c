//! Redis-backed pending-work queue
//!
//! The list and the snapshot hash of a frequency are rewritten in one `MULTI/EXEC`
//! transaction, so a drain running on another connection never sees a half-built queue.

use std::fmt;

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::{debug, info, trace};

use super::{QueueResult, WorkQueue, pending_key, snapshot_key};
use crate::model::{MonitoringFrequency, Target, TargetId};

#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisQueue {
    pub async fn new(redis_url: &str) -> QueueResult<Self> {
        info!("connecting to redis at {redis_url}");

        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        info!("connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl WorkQueue for RedisQueue {
    async fn len(&self, frequency: MonitoringFrequency) -> QueueResult<usize> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(pending_key(frequency)).await?;
        Ok(len)
    }

    async fn pending(&self, frequency: MonitoringFrequency) -> QueueResult<Vec<TargetId>> {
        let mut conn = self.conn.clone();
        let ids: Vec<TargetId> = conn.lrange(pending_key(frequency), 0, -1).await?;
        trace!("read {} pending ids for {frequency}", ids.len());
        Ok(ids)
    }

    async fn snapshot(
        &self,
        frequency: MonitoringFrequency,
        id: TargetId,
    ) -> QueueResult<Option<Target>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(snapshot_key(frequency), id).await?;

        Ok(raw.map(|json| serde_json::from_str(&json)).transpose()?)
    }

    async fn replace(&self, frequency: MonitoringFrequency, targets: &[Target]) -> QueueResult<()> {
        let list = pending_key(frequency);
        let hash = snapshot_key(frequency);

        let ids: Vec<TargetId> = targets.iter().map(|target| target.id).collect();
        let snapshots = targets
            .iter()
            .map(|target| Ok((target.id, serde_json::to_string(target)?)))
            .collect::<QueueResult<Vec<(TargetId, String)>>>()?;

        let mut pipe = redis::pipe();
        pipe.atomic().del(&list).ignore().del(&hash).ignore();
        // RPUSH and HSET reject empty argument lists
        if !ids.is_empty() {
            pipe.rpush(&list, ids).ignore();
            pipe.hset_multiple(&hash, &snapshots).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn).await?;

        debug!("replaced {list} with {} ids", snapshots.len());
        Ok(())
    }
}
