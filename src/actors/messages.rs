//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to a specific actor via mpsc
//! 2. **Outcomes**: Values flowing down the pipeline through bounded queues
//! 3. **Request/Response**: oneshot channels for synchronous queries

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::model::{MonitoringFrequency, TargetId};

/// Result of probing a single target
///
/// Produced once by a probe worker and consumed once by the result aggregator. Transport
/// failures and non-2xx responses both yield `success = false`; nothing else is carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub target_id: TargetId,

    /// Address at probe time (from the queue snapshot)
    pub address: String,

    pub frequency: MonitoringFrequency,

    pub success: bool,

    pub observed_at: DateTime<Utc>,
}

/// Commands that can be sent to a dispatch group
#[derive(Debug)]
pub enum DispatchCommand {
    /// Scheduler tick; the sender never waits for it to be processed
    Tick,

    /// Drain the queue right away and report what was dispatched
    ///
    /// Used for testing and manual runs.
    DispatchNow {
        respond_to: oneshot::Sender<anyhow::Result<TickReport>>,
    },
}

/// What a dispatch group did with one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Queue length observed at the start of the tick
    pub pending: usize,

    /// Size of every chunk pushed onto the distribution queue, in push order
    pub chunk_sizes: Vec<usize>,
}

/// Commands that can be sent to the result aggregator
#[derive(Debug)]
pub enum AggregatorCommand {
    /// Flush the buffer now, responding with the number of events dispatched
    Flush { respond_to: oneshot::Sender<usize> },

    GetStats {
        respond_to: oneshot::Sender<AggregatorStats>,
    },
}

/// Result aggregator statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatorStats {
    /// Outcomes taken off the intake since startup
    pub received: u64,

    /// Outcomes currently buffered
    pub buffered: usize,

    /// Number of non-empty flushes performed
    pub flushes: u64,

    /// Domain events handed to the event bus
    pub events_dispatched: u64,
}
